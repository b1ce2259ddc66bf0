//! Parallel vectorization backend.
//!
//! Steps environments concurrently on the rayon pool. Every call joins all
//! slots before returning.

use super::vecenv::{check_actions, slot_error, stack_observations, VecEnvBackend, VecStepResult};
use crate::env::{EnvInfo, InitialPose, QuadEnv};
use crate::spaces::Box as BoxSpace;
use crate::{QuadError, Result};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use rayon::prelude::*;

/// Parallel vectorization backend using rayon
pub struct Parallel<E: QuadEnv> {
    envs: Vec<E>,
    obs_space: BoxSpace,
    action_space: BoxSpace,
}

impl<E: QuadEnv> Parallel<E> {
    /// Create a new parallel backend, constructing the environments in parallel
    pub fn new<F>(env_creator: F, num_envs: usize) -> Result<Self>
    where
        F: Fn() -> E + Send + Sync,
    {
        let envs: Vec<E> = (0..num_envs)
            .into_par_iter()
            .map(|_| env_creator())
            .collect();
        Self::from_envs(envs)
    }

    /// Wrap already constructed environments
    pub fn from_envs(envs: Vec<E>) -> Result<Self> {
        let first = envs
            .first()
            .ok_or_else(|| QuadError::Config("need at least one environment".into()))?;
        let obs_space = first.observation_space();
        let action_space = first.action_space();
        tracing::debug!(num_envs = envs.len(), "Created parallel backend");
        Ok(Self {
            envs,
            obs_space,
            action_space,
        })
    }
}

impl<E: QuadEnv> VecEnvBackend for Parallel<E> {
    fn observation_space(&self) -> BoxSpace {
        self.obs_space.clone()
    }

    fn action_space(&self) -> BoxSpace {
        self.action_space.clone()
    }

    fn num_envs(&self) -> usize {
        self.envs.len()
    }

    fn reset(&mut self, seed: Option<u64>) -> Result<(Array2<f32>, Vec<EnvInfo>)> {
        let results: Vec<(Array1<f32>, EnvInfo)> = self
            .envs
            .par_iter_mut()
            .enumerate()
            .map(|(i, env)| {
                if let Some(s) = seed {
                    env.seed(s + i as u64);
                }
                env.reset(None).map_err(|e| slot_error(i, e))
            })
            .collect::<Result<_>>()?;

        let (observations, infos): (Vec<_>, Vec<_>) = results.into_iter().unzip();
        let obs = stack_observations(&observations, self.obs_space.dim())?;
        Ok((obs, infos))
    }

    fn reset_slot(&mut self, slot: usize, pose: Option<&InitialPose>) -> Result<Array1<f32>> {
        let env = self
            .envs
            .get_mut(slot)
            .ok_or_else(|| QuadError::Config(format!("no environment in slot {slot}")))?;
        let (obs, _) = env.reset(pose).map_err(|e| slot_error(slot, e))?;
        Ok(obs)
    }

    fn step(&mut self, actions: ArrayView2<f32>) -> Result<VecStepResult> {
        check_actions(actions, self.envs.len(), self.action_space.dim())?;
        let rows: Vec<ArrayView1<f32>> = actions.outer_iter().collect();

        let results = self
            .envs
            .par_iter_mut()
            .zip(rows.into_par_iter())
            .enumerate()
            .map(|(i, (env, action))| env.step(action).map_err(|e| slot_error(i, e)))
            .collect::<Result<Vec<_>>>()?;

        VecStepResult::from_steps(results, self.obs_space.dim())
    }

    fn set_target_position(&mut self, target: ArrayView1<f32>) -> Result<()> {
        self.envs
            .par_iter_mut()
            .try_for_each(|env| env.set_target_position(target))
    }

    fn close(&mut self) {
        self.envs.par_iter_mut().for_each(|env| env.close());
    }
}
