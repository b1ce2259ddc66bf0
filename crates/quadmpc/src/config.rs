//! Experiment configuration.
//!
//! Defaults can be overridden with `QUADMPC_*` environment variables; JSON
//! files only need to name the fields they change.

use crate::dynamics::PredictionTarget;
use crate::history::HistoryShape;
use crate::planner::{PlannerConfig, SamplerKind};
use crate::reward::RewardType;
use crate::rollout::CollectorConfig;
use crate::vector::VecEnvConfig;
use crate::{QuadError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentConfig {
    /// Registered environment name (`quadrotor`, `point_mass`)
    pub env_name: String,
    /// History depth fed to the dynamics model
    pub nstack: usize,
    pub hidden_layers: Vec<usize>,
    pub prediction_target: PredictionTarget,
    pub reward_type: RewardType,
    /// Goal position for collection
    pub target: Vec<f32>,

    /// Planner horizon.
    pub horizon: usize,
    /// Candidate sequences per planning call.
    pub candidates: usize,
    pub discount: f32,
    pub sampler: SamplerKind,

    pub max_path_length: usize,
    pub total_samples: usize,
    pub num_parallel: usize,
    /// Step slots on the rayon pool
    pub parallel: bool,
    pub seed: Option<u64>,

    /// Rotor whose thrust is scaled down, if any
    pub crippled_rotor: Option<usize>,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            env_name: env_or("QUADMPC_ENV", "quadrotor".to_string()),
            nstack: env_or("QUADMPC_NSTACK", 4),
            hidden_layers: vec![250, 250, 250],
            prediction_target: PredictionTarget::Delta,
            reward_type: RewardType::Distance,
            target: vec![0.8; 3],
            horizon: env_or("QUADMPC_HORIZON", 20),
            candidates: env_or("QUADMPC_CANDIDATES", 1500),
            discount: env_or("QUADMPC_DISCOUNT", 0.99),
            sampler: SamplerKind::Uniform,
            max_path_length: env_or("QUADMPC_MAX_PATH_LENGTH", 250),
            total_samples: env_or("QUADMPC_TOTAL_SAMPLES", 10_000),
            num_parallel: env_or("QUADMPC_NUM_PARALLEL", 4),
            parallel: false,
            seed: std::env::var("QUADMPC_SEED")
                .ok()
                .and_then(|v| v.parse().ok()),
            crippled_rotor: None,
        }
    }
}

impl ExperimentConfig {
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let data = std::fs::read(path.as_ref())?;
        let config: Self = serde_json::from_slice(&data)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json_file(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path.as_ref(), serde_json::to_vec_pretty(self)?)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.nstack == 0 {
            return Err(QuadError::Config("nstack must be positive".into()));
        }
        if self.num_parallel == 0 {
            return Err(QuadError::Config("num_parallel must be positive".into()));
        }
        if self.max_path_length == 0 {
            return Err(QuadError::Config("max_path_length must be positive".into()));
        }
        if self.target.len() != 3 {
            return Err(QuadError::Config(format!(
                "target must have 3 coordinates, got {}",
                self.target.len()
            )));
        }
        if let Some(rotor) = self.crippled_rotor {
            if rotor >= 4 {
                return Err(QuadError::Config(format!("no rotor {rotor}")));
            }
        }
        self.planner_config().validate()
    }

    pub fn planner_config(&self) -> PlannerConfig {
        PlannerConfig {
            horizon: self.horizon,
            candidates: self.candidates,
            discount: self.discount,
            sampler: self.sampler,
            seed: self.seed,
        }
    }

    pub fn collector_config(&self) -> CollectorConfig {
        CollectorConfig {
            max_path_length: self.max_path_length,
            stack_n: self.nstack,
            seed: self.seed,
        }
    }

    pub fn vec_env_config(&self) -> VecEnvConfig {
        VecEnvConfig {
            num_envs: self.num_parallel,
            seed: self.seed,
            parallel: self.parallel,
        }
    }

    pub fn history_shape(&self, state_dim: usize, action_dim: usize) -> Result<HistoryShape> {
        HistoryShape::new(state_dim, action_dim, self.nstack)
    }

    pub fn with_env(mut self, env_name: impl Into<String>) -> Self {
        self.env_name = env_name.into();
        self
    }

    pub fn with_nstack(mut self, nstack: usize) -> Self {
        self.nstack = nstack;
        self
    }

    pub fn with_planner(mut self, horizon: usize, candidates: usize) -> Self {
        self.horizon = horizon;
        self.candidates = candidates;
        self
    }

    pub fn with_samples(mut self, total_samples: usize, max_path_length: usize) -> Self {
        self.total_samples = total_samples;
        self.max_path_length = max_path_length;
        self
    }

    pub fn with_parallel(mut self, num_parallel: usize, parallel: bool) -> Self {
        self.num_parallel = num_parallel;
        self.parallel = parallel;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_env_override_parsing() {
        std::env::set_var("QUADMPC_TEST_ONLY_VALUE", "17");
        assert_eq!(env_or("QUADMPC_TEST_ONLY_VALUE", 3usize), 17);
        std::env::set_var("QUADMPC_TEST_ONLY_VALUE", "not a number");
        assert_eq!(env_or("QUADMPC_TEST_ONLY_VALUE", 3usize), 3);
        assert_eq!(env_or("QUADMPC_TEST_ONLY_MISSING", 0.5f32), 0.5);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: ExperimentConfig =
            serde_json::from_str(r#"{"env_name": "point_mass", "nstack": 2, "reward_type": "quadratic"}"#)
                .unwrap();
        assert_eq!(config.env_name, "point_mass");
        assert_eq!(config.nstack, 2);
        assert_eq!(config.reward_type, RewardType::Quadratic);
        assert_eq!(config.hidden_layers, vec![250, 250, 250]);
        assert_eq!(config.collector_config().stack_n, 2);
    }

    #[test]
    fn test_validate() {
        let base = ExperimentConfig::default().with_planner(5, 10).with_nstack(2);
        assert!(base.validate().is_ok());
        assert!(base.clone().with_nstack(0).validate().is_err());
        assert!(base.clone().with_planner(0, 10).validate().is_err());
        let mut bad = base.clone();
        bad.crippled_rotor = Some(4);
        assert!(bad.validate().is_err());
        let mut bad = base;
        bad.target = vec![0.0; 2];
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_vec_env_config_follows_experiment() {
        let mut config = ExperimentConfig::default().with_seed(5);
        config.num_parallel = 3;
        config.parallel = true;
        let vec_config = config.vec_env_config();
        assert_eq!(vec_config, VecEnvConfig::new(3).with_seed(5).with_parallel(true));

        config.seed = None;
        assert_eq!(config.vec_env_config().seed, None);
    }

    #[test]
    fn test_json_file_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        let config = ExperimentConfig::default()
            .with_env("point_mass")
            .with_planner(7, 64)
            .with_seed(9);
        config.to_json_file(&path).unwrap();
        let loaded = ExperimentConfig::from_json_file(&path).unwrap();
        assert_eq!(loaded.env_name, "point_mass");
        assert_eq!(loaded.planner_config().horizon, 7);
        assert_eq!(loaded.seed, Some(9));
    }
}
