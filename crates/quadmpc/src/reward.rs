//! Reward and termination functions shared by environments and the planner.
//!
//! The planner scores predicted states in batches, so `RewardFn::reward`
//! takes one state per row.

use crate::{QuadError, Result};
use ndarray::{s, Array1, ArrayView1, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

/// Offset of the position block in the quadrotor observation
/// (rotation matrix first, then position).
pub const QUAD_POSITION_OFFSET: usize = 9;

/// Batched reward over states.
pub trait RewardFn: Send + Sync {
    /// One reward per row of `states`
    fn reward(&self, states: ArrayView2<f32>) -> Array1<f32>;

    /// Whether a single state ends the episode
    fn is_done(&self, _state: ArrayView1<f32>) -> bool {
        false
    }

    /// Move the goal, for rewards that have one
    fn set_target(&mut self, _target: ArrayView1<f32>) -> Result<()> {
        Ok(())
    }
}

impl<F> RewardFn for F
where
    F: Fn(ArrayView2<f32>) -> Array1<f32> + Send + Sync,
{
    fn reward(&self, states: ArrayView2<f32>) -> Array1<f32> {
        self(states)
    }
}

/// Shape of the distance-to-target reward.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RewardType {
    /// `offset - scale * distance`
    #[default]
    Distance,
    /// `offset - scale * distance^2`
    Quadratic,
}

/// Reward for flying toward a target position.
///
/// Reads a 3-D position at `position_offset` inside the state vector.
/// Episodes end once the vehicle drifts further than `done_distance`.
#[derive(Clone, Debug, PartialEq)]
pub struct DistanceReward {
    target: Array1<f32>,
    position_offset: usize,
    reward_type: RewardType,
    offset: f32,
    scale: f32,
    done_distance: f32,
}

impl DistanceReward {
    pub fn new(target: Array1<f32>, position_offset: usize) -> Self {
        Self {
            target,
            position_offset,
            reward_type: RewardType::Distance,
            offset: 4.0,
            scale: 1.25,
            done_distance: 3.2,
        }
    }

    /// Reward for the 18-D quadrotor observation
    pub fn quadrotor(target: Array1<f32>) -> Self {
        Self::new(target, QUAD_POSITION_OFFSET)
    }

    pub fn with_reward_type(mut self, reward_type: RewardType) -> Self {
        self.reward_type = reward_type;
        self
    }

    pub fn with_done_distance(mut self, distance: f32) -> Self {
        self.done_distance = distance;
        self
    }

    pub fn with_scale(mut self, offset: f32, scale: f32) -> Self {
        self.offset = offset;
        self.scale = scale;
        self
    }

    pub fn target(&self) -> ArrayView1<'_, f32> {
        self.target.view()
    }

    fn position_range(&self) -> std::ops::Range<usize> {
        self.position_offset..self.position_offset + self.target.len()
    }

    /// Euclidean distance from each row's position to the target.
    pub fn distances(&self, states: ArrayView2<f32>) -> Array1<f32> {
        let positions = states.slice(s![.., self.position_range()]);
        let diff = &positions - &self.target;
        diff.mapv(|v| v * v).sum_axis(Axis(1)).mapv(f32::sqrt)
    }

    pub fn distance(&self, state: ArrayView1<f32>) -> f32 {
        state
            .slice(s![self.position_range()])
            .iter()
            .zip(self.target.iter())
            .map(|(p, t)| (p - t) * (p - t))
            .sum::<f32>()
            .sqrt()
    }

    fn shape_reward(&self, distance: f32) -> f32 {
        match self.reward_type {
            RewardType::Distance => self.offset - self.scale * distance,
            RewardType::Quadratic => self.offset - self.scale * distance * distance,
        }
    }
}

impl RewardFn for DistanceReward {
    fn reward(&self, states: ArrayView2<f32>) -> Array1<f32> {
        self.distances(states).mapv(|d| self.shape_reward(d))
    }

    fn is_done(&self, state: ArrayView1<f32>) -> bool {
        self.distance(state) > self.done_distance
    }

    fn set_target(&mut self, target: ArrayView1<f32>) -> Result<()> {
        if target.len() != self.target.len() {
            return Err(QuadError::length(self.target.len(), target.len()));
        }
        self.target.assign(&target);
        Ok(())
    }
}
