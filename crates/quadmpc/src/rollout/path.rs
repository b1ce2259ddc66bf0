//! Trajectory records produced by rollouts.

use crate::history::{HistoryShape, StackedHistory};
use crate::{QuadError, Result};
use ndarray::{Array1, Array2, ArrayView1};
use serde::{Deserialize, Serialize};

/// One finished trajectory.
///
/// Row `t` of `observations` / `actions` is the flattened stacked history
/// after the step-`t` action was appended (oldest block first).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Path {
    /// `(len, stack_n * state_dim)`
    pub observations: Array2<f32>,
    /// `(len, stack_n * action_dim)`
    pub actions: Array2<f32>,
    pub rewards: Array1<f32>,
    pub dones: Vec<bool>,
    /// `(len, state_dim)`
    pub next_obs: Array2<f32>,
    /// `next_obs - newest stacked state`, `(len, state_dim)`
    pub delta_obs: Array2<f32>,
    /// Goal position active at each step, when recorded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub targets: Option<Array2<f32>>,
}

impl Path {
    pub fn len(&self) -> usize {
        self.rewards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rewards.is_empty()
    }

    /// Undiscounted return
    pub fn total_reward(&self) -> f32 {
        self.rewards.sum()
    }

    pub fn ends_with_done(&self) -> bool {
        self.dones.last().copied().unwrap_or(false)
    }
}

/// Per-slot accumulator that becomes a `Path` once the episode ends.
#[derive(Clone, Debug)]
pub struct RunningPath {
    shape: HistoryShape,
    observations: Vec<f32>,
    actions: Vec<f32>,
    rewards: Vec<f32>,
    dones: Vec<bool>,
    next_obs: Vec<f32>,
    delta_obs: Vec<f32>,
    targets: Vec<f32>,
    target_dim: Option<usize>,
}

impl RunningPath {
    pub fn new(shape: HistoryShape) -> Self {
        Self {
            shape,
            observations: Vec::new(),
            actions: Vec::new(),
            rewards: Vec::new(),
            dones: Vec::new(),
            next_obs: Vec::new(),
            delta_obs: Vec::new(),
            targets: Vec::new(),
            target_dim: None,
        }
    }

    pub fn len(&self) -> usize {
        self.rewards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rewards.is_empty()
    }

    /// Record one step from the current stacked history.
    pub fn push(
        &mut self,
        history: &StackedHistory,
        reward: f32,
        done: bool,
        next_obs: ArrayView1<f32>,
        target: Option<ArrayView1<f32>>,
    ) -> Result<()> {
        if history.shape() != self.shape {
            return Err(QuadError::ShapeMismatch {
                expected: self.shape.as_vec(),
                actual: history.shape().as_vec(),
            });
        }
        if next_obs.len() != self.shape.state_dim {
            return Err(QuadError::length(self.shape.state_dim, next_obs.len()));
        }
        if let Some(target) = target {
            match self.target_dim {
                Some(dim) if dim != target.len() => {
                    return Err(QuadError::length(dim, target.len()));
                }
                Some(_) => {}
                None if self.is_empty() => self.target_dim = Some(target.len()),
                None => {
                    return Err(QuadError::Data(
                        "target recorded for only part of a path".into(),
                    ))
                }
            }
            self.targets.extend(target.iter());
        } else if self.target_dim.is_some() {
            return Err(QuadError::Data(
                "target recorded for only part of a path".into(),
            ));
        }

        let last_state = history.last_state();
        self.observations
            .extend(history.flattened_states().iter());
        self.actions.extend(history.flattened_actions().iter());
        self.rewards.push(reward);
        self.dones.push(done);
        self.next_obs.extend(next_obs.iter());
        self.delta_obs
            .extend(next_obs.iter().zip(last_state.iter()).map(|(n, l)| n - l));
        Ok(())
    }

    /// Convert the recorded steps into a `Path`, leaving this one empty.
    pub fn freeze(&mut self) -> Result<Path> {
        let len = self.len();
        let state_dim = self.shape.state_dim;
        let targets = match self.target_dim {
            Some(dim) => Some(Array2::from_shape_vec(
                (len, dim),
                std::mem::take(&mut self.targets),
            )?),
            None => None,
        };
        self.target_dim = None;

        Ok(Path {
            observations: Array2::from_shape_vec(
                (len, self.shape.state_width()),
                std::mem::take(&mut self.observations),
            )?,
            actions: Array2::from_shape_vec(
                (len, self.shape.action_width()),
                std::mem::take(&mut self.actions),
            )?,
            rewards: Array1::from(std::mem::take(&mut self.rewards)),
            dones: std::mem::take(&mut self.dones),
            next_obs: Array2::from_shape_vec((len, state_dim), std::mem::take(&mut self.next_obs))?,
            delta_obs: Array2::from_shape_vec(
                (len, state_dim),
                std::mem::take(&mut self.delta_obs),
            )?,
            targets,
        })
    }
}
