//! Serial (sequential) vectorization backend.
//!
//! Runs environments one at a time in a single thread.
//! Useful for debugging and small-scale experiments.

use super::vecenv::{check_actions, slot_error, stack_observations, VecEnvBackend, VecStepResult};
use crate::env::{EnvInfo, InitialPose, QuadEnv};
use crate::spaces::Box as BoxSpace;
use crate::{QuadError, Result};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2};

/// Serial vectorization backend
pub struct Serial<E: QuadEnv> {
    envs: Vec<E>,
    obs_space: BoxSpace,
    action_space: BoxSpace,
}

impl<E: QuadEnv> Serial<E> {
    /// Create a new serial backend
    pub fn new<F>(env_creator: F, num_envs: usize) -> Result<Self>
    where
        F: Fn() -> E,
    {
        Self::from_envs((0..num_envs).map(|_| env_creator()).collect())
    }

    /// Wrap already constructed environments
    pub fn from_envs(envs: Vec<E>) -> Result<Self> {
        let first = envs
            .first()
            .ok_or_else(|| QuadError::Config("need at least one environment".into()))?;
        let obs_space = first.observation_space();
        let action_space = first.action_space();
        Ok(Self {
            envs,
            obs_space,
            action_space,
        })
    }

    pub fn envs(&self) -> &[E] {
        &self.envs
    }
}

impl<E: QuadEnv> VecEnvBackend for Serial<E> {
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
        let mut observations = Vec::with_capacity(self.envs.len());
        let mut infos = Vec::with_capacity(self.envs.len());

        for (i, env) in self.envs.iter_mut().enumerate() {
            if let Some(s) = seed {
                env.seed(s + i as u64);
            }
            let (obs, info) = env.reset(None).map_err(|e| slot_error(i, e))?;
            observations.push(obs);
            infos.push(info);
        }

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
        let mut results = Vec::with_capacity(self.envs.len());
        for (i, (env, action)) in self.envs.iter_mut().zip(actions.outer_iter()).enumerate() {
            results.push(env.step(action).map_err(|e| slot_error(i, e))?);
        }
        VecStepResult::from_steps(results, self.obs_space.dim())
    }

    fn set_target_position(&mut self, target: ArrayView1<f32>) -> Result<()> {
        for env in &mut self.envs {
            env.set_target_position(target)?;
        }
        Ok(())
    }

    fn close(&mut self) {
        for env in &mut self.envs {
            env.close();
        }
    }
}
