//! Sample collection over a vectorized environment.

use super::path::{Path, RunningPath};
use crate::data::{DataProcessor, ProcessedBatch};
use crate::history::{HistoryShape, StackedHistory};
use crate::log::{MetricLogger, NoOpLogger};
use crate::planner::{Policy, UniformPolicy};
use crate::vector::{VecEnvBackend, VecStepResult};
use crate::{QuadError, Result};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Rollout collection settings
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorConfig {
    /// Paths are cut at this many steps
    pub max_path_length: usize,
    /// History depth kept per slot
    pub stack_n: usize,
    /// Seed for environment resets and random actions
    pub seed: Option<u64>,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            max_path_length: 250,
            stack_n: 4,
            seed: None,
        }
    }
}

/// Shared flag that stops a running collection between steps.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Clear the flag so the collector can run again
    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Drives `num_envs` slots with a policy (or random actions) and cuts the
/// resulting streams into paths.
pub struct RolloutCollector<B: VecEnvBackend, P: Policy> {
    env: B,
    policy: P,
    random: UniformPolicy,
    config: CollectorConfig,
    shape: HistoryShape,
    logger: Box<dyn MetricLogger>,
    cancel: CancelToken,
    total_steps: u64,
}

impl<B: VecEnvBackend, P: Policy> RolloutCollector<B, P> {
    pub fn new(env: B, policy: P, config: CollectorConfig) -> Result<Self> {
        if config.max_path_length == 0 {
            return Err(QuadError::Config("max_path_length must be positive".into()));
        }
        let action_space = env.action_space();
        let shape = HistoryShape::new(
            env.observation_space().dim(),
            action_space.dim(),
            config.stack_n,
        )?;
        let random = UniformPolicy::new(action_space, config.seed);
        Ok(Self {
            env,
            policy,
            random,
            config,
            shape,
            logger: Box::new(NoOpLogger),
            cancel: CancelToken::new(),
            total_steps: 0,
        })
    }

    pub fn with_logger(mut self, logger: Box<dyn MetricLogger>) -> Self {
        self.logger = logger;
        self
    }

    /// Token that stops `run` at the next step boundary
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn shape(&self) -> HistoryShape {
        self.shape
    }

    pub fn config(&self) -> &CollectorConfig {
        &self.config
    }

    pub fn policy(&self) -> &P {
        &self.policy
    }

    pub fn policy_mut(&mut self) -> &mut P {
        &mut self.policy
    }

    pub fn env_mut(&mut self) -> &mut B {
        &mut self.env
    }

    /// Steps taken over the collector's lifetime
    pub fn total_steps(&self) -> u64 {
        self.total_steps
    }

    /// Collect paths until their total length reaches `total_samples`.
    pub fn run(&mut self, total_samples: usize, random_policy: bool) -> Result<Vec<Path>> {
        self.run_with_progress(total_samples, random_policy, |_| {})
    }

    /// `run`, reporting the completed sample count after every finished path.
    pub fn run_with_progress<F: FnMut(usize)>(
        &mut self,
        total_samples: usize,
        random_policy: bool,
        mut progress: F,
    ) -> Result<Vec<Path>> {
        let mut paths = Vec::new();
        if total_samples == 0 {
            return Ok(paths);
        }

        let num_envs = self.env.num_envs();
        let action_dim = self.shape.action_dim;
        let (observations, _) = self.env.reset(self.config.seed)?;
        self.check_batch("reset", observations.dim(), num_envs)?;
        let mut histories = observations
            .outer_iter()
            .map(|obs| StackedHistory::new(self.shape, Some(obs), None))
            .collect::<Result<Vec<_>>>()?;
        let mut running: Vec<RunningPath> =
            (0..num_envs).map(|_| RunningPath::new(self.shape)).collect();

        let mut n_samples = 0;
        while n_samples < total_samples {
            if self.cancel.is_cancelled() {
                tracing::warn!(
                    completed = paths.len(),
                    samples = n_samples,
                    "Collection cancelled"
                );
                break;
            }

            let actions = if random_policy {
                self.random.sample_batch(num_envs)
            } else {
                let mut actions = Array2::zeros((num_envs, action_dim));
                for (mut row, history) in actions.rows_mut().into_iter().zip(&histories) {
                    let action = self.policy.act(history)?;
                    if action.len() != action_dim {
                        return Err(QuadError::length(action_dim, action.len()));
                    }
                    row.assign(&action);
                }
                actions
            };

            let result = self.env.step(actions.view())?;
            self.check_step(&result, num_envs)?;
            let dones = result.dones();
            self.total_steps += 1;

            for slot in 0..num_envs {
                let next_obs = result.observations.row(slot);
                let history = &mut histories[slot];
                history.push_action(actions.row(slot))?;
                running[slot].push(history, result.rewards[slot], dones[slot], next_obs, None)?;

                let info = &result.infos[slot];
                if let (Some(ret), Some(len)) = (info.episode_return, info.episode_length) {
                    self.logger
                        .log_scalar("episode/return", ret as f64, self.total_steps);
                    self.logger
                        .log_scalar("episode/length", len as f64, self.total_steps);
                }

                if running[slot].len() < self.config.max_path_length && !dones[slot] {
                    history.push_state(next_obs)?;
                    continue;
                }

                let path = running[slot].freeze()?;
                n_samples += path.len();
                tracing::info!(
                    slot,
                    length = path.len(),
                    ret = path.total_reward(),
                    "Path finished"
                );
                self.logger
                    .log_scalar("path/return", path.total_reward() as f64, self.total_steps);
                self.logger
                    .log_scalar("path/length", path.len() as f64, self.total_steps);
                paths.push(path);
                progress(n_samples);

                let obs = self.env.reset_slot(slot, None)?;
                history.reset(Some(obs.view()), None)?;
            }
        }

        self.logger
            .log_scalar("collect/samples", n_samples as f64, self.total_steps);
        tracing::info!(paths = paths.len(), samples = n_samples, "Collection finished");
        Ok(paths)
    }

    fn check_batch(&self, stage: &str, dim: (usize, usize), num_envs: usize) -> Result<()> {
        let expected = (num_envs, self.shape.state_dim);
        if dim != expected {
            return Err(QuadError::EnvironmentStep(format!(
                "{stage} returned a {:?} observation batch, expected {:?}",
                dim, expected
            )));
        }
        Ok(())
    }

    /// Every per-slot field of a step result must cover all `num_envs` slots.
    fn check_step(&self, result: &VecStepResult, num_envs: usize) -> Result<()> {
        self.check_batch("step", result.observations.dim(), num_envs)?;
        let lengths = [
            ("rewards", result.rewards.len()),
            ("terminated", result.terminated.len()),
            ("truncated", result.truncated.len()),
            ("infos", result.infos.len()),
        ];
        for (field, len) in lengths {
            if len != num_envs {
                return Err(QuadError::EnvironmentStep(format!(
                    "step returned {len} {field} for {num_envs} environments"
                )));
            }
        }
        Ok(())
    }

    /// Collect, then hand the paths to a processor.
    pub fn collect_and_process<D: DataProcessor>(
        &mut self,
        total_samples: usize,
        random_policy: bool,
        processor: &D,
    ) -> Result<ProcessedBatch> {
        let paths = self.run(total_samples, random_policy)?;
        processor.process(&paths)
    }
}
