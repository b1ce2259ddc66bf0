//! Environment traits and wrappers.
//!
//! Provides the core `QuadEnv` trait that simulators implement, plus wrappers
//! for episode statistics and action clipping.

mod traits;
mod wrappers;

pub use traits::{EnvInfo, InitialPose, QuadEnv, StepResult};
pub use wrappers::{ClipAction, EpisodeStats};
