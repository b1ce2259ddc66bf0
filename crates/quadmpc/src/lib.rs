//! # quadmpc
//!
//! Model-based reinforcement learning for quadrotor flight control in Rust.
//!
//! ## Overview
//!
//! quadmpc provides:
//! - Fixed-depth state/action histories (`StackedHistory`) and their batched
//!   counterpart used during planning (`BatchedStackedHistory`)
//! - A `DynamicsModel` abstraction with input normalization and an
//!   inference-only MLP
//! - A random-shooting MPC planner (`RandomShooter`) that evaluates every
//!   candidate action sequence with one batched model call per timestep
//! - Vectorized environments (serial and parallel) and a `RolloutCollector`
//!   producing training paths
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use quadmpc::prelude::*;
//! use quadmpc_envs::Quadrotor;
//!
//! let shape = HistoryShape::new(18, 4, 4)?;
//! let model = MlpDynamics::new(shape, &[250, 250], PredictionTarget::Delta, &mut rng);
//! let reward = DistanceReward::quadrotor(target);
//! let mut planner = RandomShooter::new(PlannerConfig::default(), action_space, model, reward)?;
//!
//! let env = VecEnv::from_backend(Serial::new(Quadrotor::new, 4)?);
//! let mut collector = RolloutCollector::new(env, planner, CollectorConfig::default())?;
//! let paths = collector.run(10_000, false)?;
//! ```

pub mod checkpoint;
pub mod config;
pub mod data;
pub mod dynamics;
pub mod env;
pub mod history;
pub mod log;
pub mod planner;
pub mod reward;
pub mod rollout;
pub mod spaces;
pub mod utils;
pub mod vector;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::checkpoint::{Checkpointable, DynamicsCheckpoint};
    pub use crate::config::ExperimentConfig;
    pub use crate::data::{DataProcessor, ProcessedBatch, ReturnsProcessor};
    pub use crate::dynamics::{DynamicsModel, MlpDynamics, Normalization, PredictionTarget};
    pub use crate::env::{EnvInfo, InitialPose, QuadEnv, StepResult};
    pub use crate::history::{BatchedStackedHistory, HistoryShape, StackedHistory};
    pub use crate::log::{CompositeLogger, ConsoleLogger, MetricLogger, NoOpLogger};
    pub use crate::planner::{PlannerConfig, Policy, RandomShooter, SamplerKind, UniformPolicy};
    pub use crate::reward::{DistanceReward, RewardFn, RewardType};
    pub use crate::rollout::{
        evaluate, CancelToken, CollectorConfig, EvalConfig, Path, RolloutCollector,
        TargetSchedule,
    };
    pub use crate::spaces::{Box as BoxSpace, Space};
    pub use crate::vector::{Parallel, Serial, VecEnv, VecEnvBackend, VecEnvConfig};
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Error types for the library
#[derive(Debug, thiserror::Error)]
pub enum QuadError {
    #[error("Shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    #[error("Invalid history: {0}")]
    InvalidHistory(String),

    #[error("Environment step failed: {0}")]
    EnvironmentStep(String),

    #[error("Normalization statistics are not set on the dynamics model")]
    NormalizationUnavailable,

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Data error: {0}")]
    Data(String),

    #[error("Array error: {0}")]
    Array(#[from] ndarray::ShapeError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl QuadError {
    /// Shorthand for a one-dimensional length mismatch.
    pub fn length(expected: usize, actual: usize) -> Self {
        Self::ShapeMismatch {
            expected: vec![expected],
            actual: vec![actual],
        }
    }
}

pub type Result<T> = std::result::Result<T, QuadError>;
