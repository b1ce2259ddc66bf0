//! Turning collected paths into training batches.

use crate::dynamics::{Normalization, PredictionTarget};
use crate::rollout::Path;
use crate::{QuadError, Result};
use ndarray::{concatenate, Array1, Array2, ArrayView1, ArrayView2, Axis};

/// Consumes finished paths and produces a training-ready batch.
pub trait DataProcessor {
    fn process(&self, paths: &[Path]) -> Result<ProcessedBatch>;
}

/// All steps of a set of paths, concatenated in path order.
#[derive(Clone, Debug)]
pub struct ProcessedBatch {
    /// `[stacked states | stacked actions]` per step, the model input layout
    pub inputs: Array2<f32>,
    pub next_obs: Array2<f32>,
    pub delta_obs: Array2<f32>,
    pub rewards: Array1<f32>,
    /// Discounted return from each step to the end of its path
    pub returns: Array1<f32>,
    pub dones: Vec<bool>,
    /// Undiscounted total of each path
    pub path_returns: Vec<f32>,
    /// Statistics of `inputs`
    pub input_normalization: Normalization,
    /// Statistics of `delta_obs`
    pub delta_normalization: Normalization,
}

impl ProcessedBatch {
    pub fn len(&self) -> usize {
        self.rewards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rewards.is_empty()
    }

    /// Regression targets for a model predicting `target`.
    pub fn targets(&self, target: PredictionTarget) -> ArrayView2<'_, f32> {
        match target {
            PredictionTarget::Delta => self.delta_obs.view(),
            PredictionTarget::NextState => self.next_obs.view(),
        }
    }

    pub fn mean_path_return(&self) -> f32 {
        if self.path_returns.is_empty() {
            return 0.0;
        }
        self.path_returns.iter().sum::<f32>() / self.path_returns.len() as f32
    }
}

/// `G_t = r_t + discount * G_{t+1}` over one path.
pub fn discounted_returns(rewards: ArrayView1<f32>, discount: f32) -> Array1<f32> {
    let mut returns = Array1::zeros(rewards.len());
    let mut running = 0.0f32;
    for (ret, &reward) in returns.iter_mut().rev().zip(rewards.iter().rev()) {
        running = reward + discount * running;
        *ret = running;
    }
    returns
}

/// Computes discounted returns and normalization statistics.
#[derive(Clone, Debug)]
pub struct ReturnsProcessor {
    pub discount: f32,
    pub epsilon: f32,
}

impl ReturnsProcessor {
    pub fn new(discount: f32) -> Self {
        Self {
            discount,
            epsilon: 1e-10,
        }
    }

    pub fn with_epsilon(mut self, epsilon: f32) -> Self {
        self.epsilon = epsilon;
        self
    }
}

impl Default for ReturnsProcessor {
    fn default() -> Self {
        Self::new(0.99)
    }
}

impl DataProcessor for ReturnsProcessor {
    fn process(&self, paths: &[Path]) -> Result<ProcessedBatch> {
        let paths: Vec<&Path> = paths.iter().filter(|p| !p.is_empty()).collect();
        if paths.is_empty() {
            return Err(QuadError::Data("no samples to process".into()));
        }

        let inputs = paths
            .iter()
            .map(|p| concatenate(Axis(1), &[p.observations.view(), p.actions.view()]))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let stack = |arrays: Vec<ArrayView2<f32>>| -> Result<Array2<f32>> {
            Ok(concatenate(Axis(0), &arrays)?)
        };

        let inputs = stack(inputs.iter().map(|a| a.view()).collect())?;
        let next_obs = stack(paths.iter().map(|p| p.next_obs.view()).collect())?;
        let delta_obs = stack(paths.iter().map(|p| p.delta_obs.view()).collect())?;
        let rewards: Array1<f32> = paths.iter().flat_map(|p| p.rewards.iter().copied()).collect();
        let returns: Array1<f32> = paths
            .iter()
            .flat_map(|p| discounted_returns(p.rewards.view(), self.discount).to_vec())
            .collect();
        let dones = paths.iter().flat_map(|p| p.dones.iter().copied()).collect();
        let path_returns = paths.iter().map(|p| p.total_reward()).collect();

        let input_normalization = Normalization::from_data(inputs.view(), self.epsilon)?;
        let delta_normalization = Normalization::from_data(delta_obs.view(), self.epsilon)?;
        tracing::debug!(
            samples = rewards.len(),
            paths = paths.len(),
            "Processed paths"
        );

        Ok(ProcessedBatch {
            inputs,
            next_obs,
            delta_obs,
            rewards,
            returns,
            dones,
            path_returns,
            input_normalization,
            delta_normalization,
        })
    }
}
