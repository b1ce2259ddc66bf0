//! Reference environments for quadmpc.
//!
//! - `Quadrotor` - rigid-body quadrotor flying to a target
//! - `PointMass` - 3-D double integrator with the same reward
//!
//! `make_env` builds either from an `ExperimentConfig`.

mod point_mass;
mod quadrotor;

pub use point_mass::PointMass;
pub use quadrotor::Quadrotor;

use ndarray::Array1;
use quadmpc::config::ExperimentConfig;
use quadmpc::env::{ClipAction, EpisodeStats, QuadEnv};
use quadmpc::reward::DistanceReward;
use quadmpc::{QuadError, Result};

/// Names accepted by `make_env`, with a one-line description each.
pub const ENV_NAMES: &[(&str, &str)] = &[
    ("quadrotor", "18-D rigid-body quadrotor, 4 rotor commands in [0, 100]"),
    ("point_mass", "6-D point mass, 3 accelerations in [-1, 1]"),
];

/// Thrust fraction left on a rotor named by `crippled_rotor`.
pub const FAILED_ROTOR_EFFICIENCY: f32 = 0.0;

/// The reward `make_env` attaches to `config.env_name`, for planners that
/// score predicted states the same way the environment scores real ones.
pub fn make_reward(config: &ExperimentConfig) -> Result<DistanceReward> {
    let target = Array1::from(config.target.clone());
    let reward = match config.env_name.as_str() {
        "quadrotor" => DistanceReward::quadrotor(target),
        "point_mass" => DistanceReward::new(target, 0),
        other => {
            return Err(QuadError::Config(format!(
                "unknown environment '{other}' (expected one of: {})",
                ENV_NAMES
                    .iter()
                    .map(|(name, _)| *name)
                    .collect::<Vec<_>>()
                    .join(", ")
            )))
        }
    };
    Ok(reward.with_reward_type(config.reward_type))
}

/// Build a boxed environment from `config.env_name`.
///
/// The target, reward type and crippled rotor come from the config. Each
/// call with a seeded config yields an identically seeded environment.
/// Actions are clipped to the action space and finished episodes report
/// their return and length in `EnvInfo`.
pub fn make_env(config: &ExperimentConfig) -> Result<Box<dyn QuadEnv>> {
    let reward = make_reward(config)?;
    let mut env = if config.env_name == "quadrotor" {
        let mut env = Quadrotor::new().with_reward(reward);
        if let Some(rotor) = config.crippled_rotor {
            env = env.with_crippled_rotor(rotor, FAILED_ROTOR_EFFICIENCY)?;
        }
        wrap(env)
    } else {
        wrap(PointMass::new().with_reward(reward))
    };
    if let Some(seed) = config.seed {
        env.seed(seed);
    }
    Ok(env)
}

fn wrap<E: QuadEnv + 'static>(env: E) -> Box<dyn QuadEnv> {
    Box::new(ClipAction::new(EpisodeStats::new(env)))
}
