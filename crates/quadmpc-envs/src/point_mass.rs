//! Point-mass environment: a 3-D double integrator with the quadrotor's
//! reward, for quick experiments without rotational dynamics.

use ndarray::{s, Array1, ArrayView1, Axis};
use quadmpc::env::{EnvInfo, InitialPose, QuadEnv, StepResult};
use quadmpc::reward::{DistanceReward, RewardFn};
use quadmpc::spaces::Box as BoxSpace;
use quadmpc::{QuadError, Result};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Observation: position (3) then velocity (3). Actions are accelerations
/// in `[-1, 1]` scaled by `max_accel`.
pub struct PointMass {
    max_accel: f32,
    damping: f32,
    dt: f32,
    spawn_radius: f32,

    state: Array1<f32>,
    reward: DistanceReward,
    rng: ChaCha8Rng,
}

impl PointMass {
    pub fn new() -> Self {
        Self {
            max_accel: 2.0,
            damping: 0.1,
            dt: 0.05,
            spawn_radius: 3.1,
            state: Array1::zeros(6),
            reward: DistanceReward::new(Array1::zeros(3), 0),
            rng: ChaCha8Rng::from_entropy(),
        }
    }

    pub fn with_reward(mut self, reward: DistanceReward) -> Self {
        self.reward = reward;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = ChaCha8Rng::seed_from_u64(seed);
        self
    }
}

impl Default for PointMass {
    fn default() -> Self {
        Self::new()
    }
}

impl QuadEnv for PointMass {
    fn observation_space(&self) -> BoxSpace {
        BoxSpace::unbounded(6)
    }

    fn action_space(&self) -> BoxSpace {
        BoxSpace::uniform(3, -1.0, 1.0)
    }

    fn seed(&mut self, seed: u64) {
        self.rng = ChaCha8Rng::seed_from_u64(seed);
    }

    fn reset(&mut self, pose: Option<&InitialPose>) -> Result<(Array1<f32>, EnvInfo)> {
        self.state.fill(0.0);
        match pose {
            Some(pose) => {
                if pose.position.len() != 3 {
                    return Err(QuadError::length(3, pose.position.len()));
                }
                self.state.slice_mut(s![..3]).assign(&pose.position);
            }
            None => {
                let half = (self.spawn_radius * self.spawn_radius / 3.0).sqrt();
                let target = self.reward.target().to_owned();
                for (p, t) in self.state.slice_mut(s![..3]).iter_mut().zip(target.iter()) {
                    *p = t + self.rng.gen_range(-half..half);
                }
            }
        }
        Ok((self.state.clone(), EnvInfo::new()))
    }

    fn step(&mut self, action: ArrayView1<f32>) -> Result<StepResult> {
        if action.len() != 3 {
            return Err(QuadError::length(3, action.len()));
        }
        for i in 0..3 {
            let accel = action[i].clamp(-1.0, 1.0) * self.max_accel - self.damping * self.state[3 + i];
            self.state[3 + i] += accel * self.dt;
            self.state[i] += self.state[3 + i] * self.dt;
        }

        let observation = self.state.clone();
        let reward = self
            .reward
            .reward(observation.view().insert_axis(Axis(0)))[0];
        Ok(StepResult {
            terminated: self.reward.is_done(observation.view()),
            truncated: false,
            info: EnvInfo::new().with_extra("distance", self.reward.distance(observation.view())),
            observation,
            reward,
        })
    }

    fn set_target_position(&mut self, target: ArrayView1<f32>) -> Result<()> {
        self.reward.set_target(target)
    }

    fn target_position(&self) -> Option<Array1<f32>> {
        Some(self.reward.target().to_owned())
    }

    fn dt(&self) -> f32 {
        self.dt
    }

    fn render(&self) -> Option<String> {
        Some(format!(
            "pos=({:.2}, {:.2}, {:.2}) vel=({:.2}, {:.2}, {:.2})",
            self.state[0], self.state[1], self.state[2], self.state[3], self.state[4], self.state[5]
        ))
    }
}
