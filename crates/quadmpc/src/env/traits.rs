//! Core environment trait definitions.

use crate::spaces::Box as BoxSpace;
use crate::Result;
use ndarray::{Array1, ArrayView1};

/// Information returned from environment steps
#[derive(Clone, Debug, Default)]
pub struct EnvInfo {
    /// Episode return (if done)
    pub episode_return: Option<f32>,
    /// Episode length (if done)
    pub episode_length: Option<f32>,
    /// Custom metrics (kept minimal for performance)
    pub extra: smallvec::SmallVec<[(&'static str, f32); 4]>,
}

impl EnvInfo {
    /// Create empty info
    pub fn new() -> Self {
        Self::default()
    }

    /// Add episode stats
    pub fn with_episode_stats(mut self, ret: f32, len: u32) -> Self {
        self.episode_return = Some(ret);
        self.episode_length = Some(len as f32);
        self
    }

    /// Add a custom metric
    pub fn with_extra(mut self, key: &'static str, value: f32) -> Self {
        self.extra.push((key, value));
        self
    }

    /// Get a value by key
    pub fn get(&self, key: &str) -> Option<f32> {
        match key {
            "episode_return" => self.episode_return,
            "episode_length" => self.episode_length,
            _ => self.extra.iter().find(|(k, _)| k == &key).map(|(_, v)| *v),
        }
    }
}

/// Result from a single environment step
#[derive(Clone, Debug)]
pub struct StepResult {
    /// Observation after the step
    pub observation: Array1<f32>,
    /// Reward received
    pub reward: f32,
    /// Episode ended because of the task (e.g. flew out of bounds)
    pub terminated: bool,
    /// Episode cut short by the environment (e.g. its own time limit)
    pub truncated: bool,
    /// Additional info
    pub info: EnvInfo,
}

impl StepResult {
    /// Check if episode is done (terminated or truncated)
    pub fn done(&self) -> bool {
        self.terminated || self.truncated
    }
}

/// Initial position and orientation (roll, pitch, yaw) for a reset.
#[derive(Clone, Debug, PartialEq)]
pub struct InitialPose {
    pub position: Array1<f32>,
    pub orientation: Array1<f32>,
}

impl InitialPose {
    pub fn new(position: Array1<f32>, orientation: Array1<f32>) -> Self {
        Self {
            position,
            orientation,
        }
    }

    /// Level hover at the origin
    pub fn origin() -> Self {
        Self::new(Array1::zeros(3), Array1::zeros(3))
    }
}

/// Single quadrotor simulator.
///
/// Observations and actions are flat vectors described by box spaces.
///
/// # Example
///
/// ```rust,ignore
/// use quadmpc::env::{QuadEnv, StepResult};
///
/// let mut env = Quadrotor::new();
/// env.set_target_position(array![0.8, 0.8, 0.8].view());
/// let (obs, _) = env.reset(None)?;
/// let result = env.step(action.view())?;
/// ```
pub trait QuadEnv: Send {
    /// Get the observation space
    fn observation_space(&self) -> BoxSpace;

    /// Get the action space
    fn action_space(&self) -> BoxSpace;

    /// Reseed the environment's random source
    fn seed(&mut self, _seed: u64) {}

    /// Reset the environment, optionally to a fixed pose
    ///
    /// Returns the initial observation and info.
    fn reset(&mut self, pose: Option<&InitialPose>) -> Result<(Array1<f32>, EnvInfo)>;

    /// Take a single step in the environment
    ///
    /// Errors are simulator failures; the episode cannot continue after one.
    fn step(&mut self, action: ArrayView1<f32>) -> Result<StepResult>;

    /// Move the goal the reward is measured against
    fn set_target_position(&mut self, _target: ArrayView1<f32>) -> Result<()> {
        Ok(())
    }

    /// Current goal position, if the environment has one
    fn target_position(&self) -> Option<Array1<f32>> {
        None
    }

    /// Simulation time step in seconds
    fn dt(&self) -> f32 {
        0.05
    }

    /// Optional: Render the environment
    fn render(&self) -> Option<String> {
        None
    }

    /// Optional: Close the environment and free resources
    fn close(&mut self) {}
}

impl<E: QuadEnv + ?Sized> QuadEnv for Box<E> {
    fn observation_space(&self) -> BoxSpace {
        (**self).observation_space()
    }

    fn action_space(&self) -> BoxSpace {
        (**self).action_space()
    }

    fn seed(&mut self, seed: u64) {
        (**self).seed(seed)
    }

    fn reset(&mut self, pose: Option<&InitialPose>) -> Result<(Array1<f32>, EnvInfo)> {
        (**self).reset(pose)
    }

    fn step(&mut self, action: ArrayView1<f32>) -> Result<StepResult> {
        (**self).step(action)
    }

    fn set_target_position(&mut self, target: ArrayView1<f32>) -> Result<()> {
        (**self).set_target_position(target)
    }

    fn target_position(&self) -> Option<Array1<f32>> {
        (**self).target_position()
    }

    fn dt(&self) -> f32 {
        (**self).dt()
    }

    fn render(&self) -> Option<String> {
        (**self).render()
    }

    fn close(&mut self) {
        (**self).close()
    }
}
