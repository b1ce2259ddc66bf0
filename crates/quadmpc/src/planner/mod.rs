//! Action selection: the random-shooting MPC planner and a uniform baseline.

mod random_shooter;
mod sampler;

pub use random_shooter::RandomShooter;
pub use sampler::{ActionSampler, SamplerKind};

use crate::history::StackedHistory;
use crate::spaces::Box as BoxSpace;
use crate::utils::seeded_rng;
use crate::{QuadError, Result};
use ndarray::{Array1, Array2, ArrayView1};
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

/// Picks one action from the current stacked history.
pub trait Policy {
    fn act(&mut self, history: &StackedHistory) -> Result<Array1<f32>>;

    /// Follow a moved goal position
    fn set_target(&mut self, _target: ArrayView1<f32>) -> Result<()> {
        Ok(())
    }
}

impl<P: Policy + ?Sized> Policy for Box<P> {
    fn act(&mut self, history: &StackedHistory) -> Result<Array1<f32>> {
        (**self).act(history)
    }

    fn set_target(&mut self, target: ArrayView1<f32>) -> Result<()> {
        (**self).set_target(target)
    }
}

/// Random-shooting configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    /// Number of model steps per candidate sequence
    pub horizon: usize,
    /// Number of candidate sequences per call
    pub candidates: usize,
    /// Per-step reward discount
    pub discount: f32,
    pub sampler: SamplerKind,
    /// Seed for the planner's own generator
    pub seed: Option<u64>,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            horizon: 20,
            candidates: 1500,
            discount: 0.99,
            sampler: SamplerKind::Uniform,
            seed: None,
        }
    }
}

impl PlannerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.horizon == 0 {
            return Err(QuadError::Config("horizon must be positive".into()));
        }
        if self.candidates == 0 {
            return Err(QuadError::Config("candidates must be positive".into()));
        }
        if !(0.0..=1.0).contains(&self.discount) {
            return Err(QuadError::Config(format!(
                "discount must be in [0, 1], got {}",
                self.discount
            )));
        }
        Ok(())
    }
}

/// Uniformly random actions, ignoring the history.
pub struct UniformPolicy {
    space: BoxSpace,
    rng: StdRng,
}

impl UniformPolicy {
    pub fn new(space: BoxSpace, seed: Option<u64>) -> Self {
        Self {
            space,
            rng: seeded_rng(seed),
        }
    }

    /// One independent action per row
    pub fn sample_batch(&mut self, rows: usize) -> Array2<f32> {
        self.space.sample_batch(&mut self.rng, rows)
    }
}

impl Policy for UniformPolicy {
    fn act(&mut self, _history: &StackedHistory) -> Result<Array1<f32>> {
        Ok(self.space.sample_batch(&mut self.rng, 1).row(0).to_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::HistoryShape;

    #[test]
    fn test_config_validation() {
        assert!(PlannerConfig::default().validate().is_ok());
        let bad = PlannerConfig {
            horizon: 0,
            ..Default::default()
        };
        assert!(bad.validate().is_err());
        let bad = PlannerConfig {
            discount: 1.5,
            ..Default::default()
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_config_json_defaults() {
        let config: PlannerConfig =
            serde_json::from_str(r#"{"horizon": 5, "sampler": {"kind": "filtered", "beta": 0.5}}"#)
                .unwrap();
        assert_eq!(config.horizon, 5);
        assert_eq!(config.candidates, 1500);
        assert_eq!(config.sampler, SamplerKind::Filtered { beta: 0.5 });
    }

    #[test]
    fn test_uniform_policy() {
        let shape = HistoryShape::new(3, 2, 2).unwrap();
        let history = StackedHistory::new(shape, None, None).unwrap();
        let mut policy = UniformPolicy::new(BoxSpace::uniform(2, 0.0, 100.0), Some(1));
        let action = policy.act(&history).unwrap();
        assert_eq!(action.len(), 2);
        assert!(action.iter().all(|&a| (0.0..=100.0).contains(&a)));
        assert_eq!(policy.sample_batch(4).dim(), (4, 2));
    }
}
