//! Environment wrappers for common functionality.

use super::{EnvInfo, InitialPose, QuadEnv, StepResult};
use crate::spaces::Box as BoxSpace;
use crate::Result;
use ndarray::{Array1, ArrayView1};

/// Wrapper that tracks episode statistics (return and length).
///
/// Adds `episode_return` and `episode_length` to info on episode completion.
pub struct EpisodeStats<E: QuadEnv> {
    env: E,
    episode_return: f32,
    episode_length: u32,
}

impl<E: QuadEnv> EpisodeStats<E> {
    /// Wrap an environment with episode statistics tracking
    pub fn new(env: E) -> Self {
        Self {
            env,
            episode_return: 0.0,
            episode_length: 0,
        }
    }

    /// Get a reference to the inner environment
    pub fn inner(&self) -> &E {
        &self.env
    }

    /// Get a mutable reference to the inner environment
    pub fn inner_mut(&mut self) -> &mut E {
        &mut self.env
    }
}

impl<E: QuadEnv> QuadEnv for EpisodeStats<E> {
    fn observation_space(&self) -> BoxSpace {
        self.env.observation_space()
    }

    fn action_space(&self) -> BoxSpace {
        self.env.action_space()
    }

    fn seed(&mut self, seed: u64) {
        self.env.seed(seed)
    }

    fn reset(&mut self, pose: Option<&InitialPose>) -> Result<(Array1<f32>, EnvInfo)> {
        self.episode_return = 0.0;
        self.episode_length = 0;
        self.env.reset(pose)
    }

    fn step(&mut self, action: ArrayView1<f32>) -> Result<StepResult> {
        let mut result = self.env.step(action)?;

        self.episode_return += result.reward;
        self.episode_length += 1;

        if result.done() {
            result.info = result
                .info
                .with_episode_stats(self.episode_return, self.episode_length);

            // Reset internal counters (env will be reset externally)
            self.episode_return = 0.0;
            self.episode_length = 0;
        }

        Ok(result)
    }

    fn set_target_position(&mut self, target: ArrayView1<f32>) -> Result<()> {
        self.env.set_target_position(target)
    }

    fn target_position(&self) -> Option<Array1<f32>> {
        self.env.target_position()
    }

    fn dt(&self) -> f32 {
        self.env.dt()
    }

    fn render(&self) -> Option<String> {
        self.env.render()
    }

    fn close(&mut self) {
        self.env.close()
    }
}

/// Wrapper that clips rotor commands to the action space bounds.
pub struct ClipAction<E: QuadEnv> {
    env: E,
    space: BoxSpace,
}

impl<E: QuadEnv> ClipAction<E> {
    /// Wrap an environment with action clipping
    pub fn new(env: E) -> Self {
        let space = env.action_space();
        Self { env, space }
    }
}

impl<E: QuadEnv> QuadEnv for ClipAction<E> {
    fn observation_space(&self) -> BoxSpace {
        self.env.observation_space()
    }

    fn action_space(&self) -> BoxSpace {
        self.space.clone()
    }

    fn seed(&mut self, seed: u64) {
        self.env.seed(seed)
    }

    fn reset(&mut self, pose: Option<&InitialPose>) -> Result<(Array1<f32>, EnvInfo)> {
        self.env.reset(pose)
    }

    fn step(&mut self, action: ArrayView1<f32>) -> Result<StepResult> {
        let mut clipped = action.to_owned();
        self.space.clip(clipped.view_mut());
        self.env.step(clipped.view())
    }

    fn set_target_position(&mut self, target: ArrayView1<f32>) -> Result<()> {
        self.env.set_target_position(target)
    }

    fn target_position(&self) -> Option<Array1<f32>> {
        self.env.target_position()
    }

    fn dt(&self) -> f32 {
        self.env.dt()
    }

    fn render(&self) -> Option<String> {
        self.env.render()
    }

    fn close(&mut self) {
        self.env.close()
    }
}
