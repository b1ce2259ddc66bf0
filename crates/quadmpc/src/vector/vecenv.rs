//! Vectorized environment abstraction.

use super::{Parallel, Serial};
use crate::env::{EnvInfo, InitialPose, QuadEnv, StepResult};
use crate::spaces::Box as BoxSpace;
use crate::{QuadError, Result};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};

/// Configuration for vectorized environments
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VecEnvConfig {
    /// Number of environments
    pub num_envs: usize,
    /// Random seed base; slot `i` is seeded with `seed + i` when set
    pub seed: Option<u64>,
    /// Step slots on the rayon pool instead of one after another
    pub parallel: bool,
}

impl Default for VecEnvConfig {
    fn default() -> Self {
        Self {
            num_envs: 1,
            seed: None,
            parallel: false,
        }
    }
}

impl VecEnvConfig {
    /// Create a new config with specified number of environments
    pub fn new(num_envs: usize) -> Self {
        Self {
            num_envs,
            ..Default::default()
        }
    }

    /// Set the random seed
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Build `num_envs` environments with `env_creator` and wrap them in the
    /// backend `parallel` selects.
    pub fn build<E, F>(&self, mut env_creator: F) -> Result<Box<dyn VecEnvBackend>>
    where
        E: QuadEnv + 'static,
        F: FnMut() -> Result<E>,
    {
        let mut envs = Vec::with_capacity(self.num_envs);
        for i in 0..self.num_envs {
            let mut env = env_creator()?;
            if let Some(seed) = self.seed {
                env.seed(seed + i as u64);
            }
            envs.push(env);
        }
        tracing::debug!(num_envs = self.num_envs, parallel = self.parallel, "Building vectorized env");
        if self.parallel {
            Ok(Box::new(Parallel::from_envs(envs)?))
        } else {
            Ok(Box::new(Serial::from_envs(envs)?))
        }
    }
}

/// Result from stepping all environments
#[derive(Clone, Debug)]
pub struct VecStepResult {
    /// Observations for all environments, one row per slot
    pub observations: Array2<f32>,
    /// Rewards for all environments
    pub rewards: Vec<f32>,
    /// Terminated flags
    pub terminated: Vec<bool>,
    /// Truncated flags
    pub truncated: Vec<bool>,
    /// Info dictionaries
    pub infos: Vec<EnvInfo>,
}

impl VecStepResult {
    /// Check which environments are done
    pub fn dones(&self) -> Vec<bool> {
        self.terminated
            .iter()
            .zip(self.truncated.iter())
            .map(|(&t, &tr)| t || tr)
            .collect()
    }

    /// Assemble per-slot results, in slot order.
    pub(crate) fn from_steps(results: Vec<StepResult>, obs_dim: usize) -> Result<Self> {
        let num_envs = results.len();
        let mut observations = Array2::zeros((num_envs, obs_dim));
        let mut rewards = Vec::with_capacity(num_envs);
        let mut terminated = Vec::with_capacity(num_envs);
        let mut truncated = Vec::with_capacity(num_envs);
        let mut infos = Vec::with_capacity(num_envs);

        for (i, result) in results.into_iter().enumerate() {
            if result.observation.len() != obs_dim {
                return Err(QuadError::EnvironmentStep(format!(
                    "slot {i}: observation has {} values, expected {obs_dim}",
                    result.observation.len()
                )));
            }
            observations.row_mut(i).assign(&result.observation);
            rewards.push(result.reward);
            terminated.push(result.terminated);
            truncated.push(result.truncated);
            infos.push(result.info);
        }

        Ok(Self {
            observations,
            rewards,
            terminated,
            truncated,
            infos,
        })
    }
}

/// Stack per-slot observations into a `(num_envs, obs_dim)` matrix.
pub(crate) fn stack_observations(rows: &[Array1<f32>], obs_dim: usize) -> Result<Array2<f32>> {
    let mut out = Array2::zeros((rows.len(), obs_dim));
    for (i, row) in rows.iter().enumerate() {
        if row.len() != obs_dim {
            return Err(QuadError::EnvironmentStep(format!(
                "slot {i}: observation has {} values, expected {obs_dim}",
                row.len()
            )));
        }
        out.row_mut(i).assign(row);
    }
    Ok(out)
}

/// Check a batched action matrix against `(num_envs, action_dim)`.
pub(crate) fn check_actions(actions: ArrayView2<f32>, num_envs: usize, action_dim: usize) -> Result<()> {
    if actions.dim() != (num_envs, action_dim) {
        return Err(QuadError::ShapeMismatch {
            expected: vec![num_envs, action_dim],
            actual: actions.shape().to_vec(),
        });
    }
    Ok(())
}

pub(crate) fn slot_error(slot: usize, err: QuadError) -> QuadError {
    match err {
        QuadError::EnvironmentStep(msg) => QuadError::EnvironmentStep(format!("slot {slot}: {msg}")),
        other => QuadError::EnvironmentStep(format!("slot {slot}: {other}")),
    }
}

/// Trait for vectorized environment backends
pub trait VecEnvBackend: Send {
    /// Get the observation space (single env)
    fn observation_space(&self) -> BoxSpace;

    /// Get the action space (single env)
    fn action_space(&self) -> BoxSpace;

    /// Get the number of environments
    fn num_envs(&self) -> usize;

    /// Reset all environments
    fn reset(&mut self, seed: Option<u64>) -> Result<(Array2<f32>, Vec<EnvInfo>)>;

    /// Reset a single slot, leaving the others untouched
    fn reset_slot(&mut self, slot: usize, pose: Option<&InitialPose>) -> Result<Array1<f32>>;

    /// Step all environments with one action row per slot
    ///
    /// Slots are not reset automatically when they finish.
    fn step(&mut self, actions: ArrayView2<f32>) -> Result<VecStepResult>;

    /// Move every slot's goal to `target`
    fn set_target_position(&mut self, target: ArrayView1<f32>) -> Result<()>;

    /// Close all environments
    fn close(&mut self);
}

impl<B: VecEnvBackend + ?Sized> VecEnvBackend for Box<B> {
    fn observation_space(&self) -> BoxSpace {
        (**self).observation_space()
    }

    fn action_space(&self) -> BoxSpace {
        (**self).action_space()
    }

    fn num_envs(&self) -> usize {
        (**self).num_envs()
    }

    fn reset(&mut self, seed: Option<u64>) -> Result<(Array2<f32>, Vec<EnvInfo>)> {
        (**self).reset(seed)
    }

    fn reset_slot(&mut self, slot: usize, pose: Option<&InitialPose>) -> Result<Array1<f32>> {
        (**self).reset_slot(slot, pose)
    }

    fn step(&mut self, actions: ArrayView2<f32>) -> Result<VecStepResult> {
        (**self).step(actions)
    }

    fn set_target_position(&mut self, target: ArrayView1<f32>) -> Result<()> {
        (**self).set_target_position(target)
    }

    fn close(&mut self) {
        (**self).close()
    }
}

/// Main vectorized environment struct
pub struct VecEnv<B: VecEnvBackend> {
    backend: B,
}

impl<B: VecEnvBackend> VecEnv<B> {
    /// Create from a backend
    pub fn from_backend(backend: B) -> Self {
        Self { backend }
    }

    /// Borrow the backend
    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn into_backend(self) -> B {
        self.backend
    }
}

impl<B: VecEnvBackend> VecEnvBackend for VecEnv<B> {
    fn observation_space(&self) -> BoxSpace {
        self.backend.observation_space()
    }

    fn action_space(&self) -> BoxSpace {
        self.backend.action_space()
    }

    fn num_envs(&self) -> usize {
        self.backend.num_envs()
    }

    fn reset(&mut self, seed: Option<u64>) -> Result<(Array2<f32>, Vec<EnvInfo>)> {
        self.backend.reset(seed)
    }

    fn reset_slot(&mut self, slot: usize, pose: Option<&InitialPose>) -> Result<Array1<f32>> {
        if slot >= self.backend.num_envs() {
            return Err(QuadError::Config(format!(
                "slot {slot} out of range for {} environments",
                self.backend.num_envs()
            )));
        }
        self.backend.reset_slot(slot, pose)
    }

    fn step(&mut self, actions: ArrayView2<f32>) -> Result<VecStepResult> {
        self.backend.step(actions)
    }

    fn set_target_position(&mut self, target: ArrayView1<f32>) -> Result<()> {
        self.backend.set_target_position(target)
    }

    fn close(&mut self) {
        self.backend.close()
    }
}
