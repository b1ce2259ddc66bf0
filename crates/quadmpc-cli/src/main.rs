//! quadmpc CLI
//!
//! Command-line interface for collecting rollouts and evaluating the
//! random-shooting planner on the reference environments.

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use ndarray::Array1;
use tracing_subscriber::EnvFilter;

use quadmpc::checkpoint::read_checkpoint;
use quadmpc::prelude::*;
use quadmpc::utils::{abbreviate, format_duration, seeded_rng};
use quadmpc_envs::{make_env, make_reward, ENV_NAMES};

#[derive(Parser)]
#[command(name = "quadmpc")]
#[command(version, about = "quadmpc - model-based quadrotor control in Rust", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Options shared by every command that builds an experiment.
#[derive(Args)]
struct ExperimentArgs {
    /// JSON experiment config; unset fields keep their defaults
    #[arg(long)]
    config: Option<PathBuf>,

    /// Environment name (overrides the config)
    #[arg(long)]
    env: Option<String>,

    /// Dynamics checkpoint; a freshly initialized model is used without one
    #[arg(long)]
    checkpoint: Option<PathBuf>,

    /// Act uniformly at random instead of planning
    #[arg(long)]
    random: bool,

    #[arg(long)]
    seed: Option<u64>,

    /// Planner horizon (overrides the config)
    #[arg(long)]
    horizon: Option<usize>,

    /// Candidate sequences per planning call (overrides the config)
    #[arg(long)]
    candidates: Option<usize>,
}

#[derive(Subcommand)]
enum Commands {
    /// List available environments
    List,

    /// Collect training paths over vectorized environments
    Collect {
        #[command(flatten)]
        experiment: ExperimentArgs,

        /// Total samples to collect (overrides the config)
        #[arg(long)]
        samples: Option<usize>,

        /// Number of environment slots (overrides the config)
        #[arg(long)]
        num_envs: Option<usize>,

        /// Write the collected paths here as JSON
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Closed-loop evaluation episodes on a single environment
    Eval {
        #[command(flatten)]
        experiment: ExperimentArgs,

        #[arg(long, default_value = "5")]
        episodes: usize,

        #[arg(long)]
        max_path_length: Option<usize>,

        /// Fixed goal, e.g. `--target 0,0,1`; otherwise the stepped schedule
        #[arg(long, value_delimiter = ',', allow_hyphen_values = true)]
        target: Option<Vec<f32>>,

        /// Start position, e.g. `--start 0,0,0`; random when unset
        #[arg(long, value_delimiter = ',', allow_hyphen_values = true)]
        start: Option<Vec<f32>>,

        /// Stride between stacked history entries
        #[arg(long, default_value = "1")]
        proportion: usize,

        /// Keep stepping after the episode reports done
        #[arg(long)]
        run_all_steps: bool,

        /// Directory receiving paths.json
        #[arg(long)]
        save_dir: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::List => list_envs(),
        Commands::Collect {
            experiment,
            samples,
            num_envs,
            output,
        } => {
            let mut config = experiment.load()?;
            if let Some(samples) = samples {
                config.total_samples = samples;
            }
            if let Some(num_envs) = num_envs {
                config.num_parallel = num_envs;
            }
            config.validate()?;
            collect(&config, &experiment, output.as_deref())?;
        }
        Commands::Eval {
            experiment,
            episodes,
            max_path_length,
            target,
            start,
            proportion,
            run_all_steps,
            save_dir,
        } => {
            let mut config = experiment.load()?;
            if let Some(max_path_length) = max_path_length {
                config.max_path_length = max_path_length;
            }
            config.validate()?;

            let schedule = match target {
                Some(point) => TargetSchedule::fixed(Array1::from(point)),
                None => TargetSchedule::default(),
            };
            let initial_pose = start.map(|p| {
                let dim = p.len();
                InitialPose::new(Array1::from(p), Array1::zeros(dim))
            });
            let eval_config = EvalConfig {
                episodes,
                max_path_length: config.max_path_length,
                proportion,
                run_all_steps,
                initial_pose,
                save_dir,
            };
            eval(&config, &experiment, &schedule, &eval_config)?;
        }
    }

    Ok(())
}

impl ExperimentArgs {
    fn load(&self) -> Result<ExperimentConfig> {
        let mut config = match &self.config {
            Some(path) => ExperimentConfig::from_json_file(path)
                .with_context(|| format!("reading config {}", path.display()))?,
            None => ExperimentConfig::default(),
        };
        if let Some(env) = &self.env {
            config = config.with_env(env.clone());
        }
        if let Some(seed) = self.seed {
            config = config.with_seed(seed);
        }
        if let Some(horizon) = self.horizon {
            config.horizon = horizon;
        }
        if let Some(candidates) = self.candidates {
            config.candidates = candidates;
        }
        Ok(config)
    }
}

/// Planner over a checkpointed (or fresh) model, or uniform random actions.
fn build_policy(
    config: &ExperimentConfig,
    args: &ExperimentArgs,
    action_space: BoxSpace,
    shape: HistoryShape,
) -> Result<Box<dyn Policy>> {
    if args.random {
        tracing::info!("Using uniform random actions");
        return Ok(Box::new(UniformPolicy::new(action_space, config.seed)));
    }

    let model = match &args.checkpoint {
        Some(path) => {
            let checkpoint = read_checkpoint(path)
                .with_context(|| format!("reading checkpoint {}", path.display()))?;
            let model = checkpoint.to_model()?;
            if model.shape() != shape {
                bail!(
                    "checkpoint was built for {:?}, the environment needs {:?}",
                    model.shape(),
                    shape
                );
            }
            tracing::info!(
                path = %path.display(),
                version = %checkpoint.version,
                "Loaded dynamics model"
            );
            model
        }
        None => {
            tracing::warn!("No checkpoint given, planning with an untrained model");
            let mut rng = seeded_rng(config.seed);
            MlpDynamics::new(shape, &config.hidden_layers, config.prediction_target, &mut rng)
                .with_normalization(Normalization::identity(shape.flat_width()))?
        }
    };
    tracing::info!(
        params = model.num_parameters(),
        horizon = config.horizon,
        candidates = config.candidates,
        "Created planner"
    );

    let planner = RandomShooter::new(
        config.planner_config(),
        action_space,
        model,
        make_reward(config)?,
    )?;
    Ok(Box::new(planner))
}

fn collect(config: &ExperimentConfig, args: &ExperimentArgs, output: Option<&Path>) -> Result<()> {
    tracing::info!(
        env = %config.env_name,
        samples = config.total_samples,
        num_envs = config.num_parallel,
        random = args.random,
        "Starting collection"
    );

    let backend = config.vec_env_config().build(|| make_env(config))?;
    let env = VecEnv::from_backend(backend);

    let shape = config.history_shape(
        env.observation_space().dim(),
        env.action_space().dim(),
    )?;
    let policy = build_policy(config, args, env.action_space(), shape)?;
    let mut collector = RolloutCollector::new(env, policy, config.collector_config())?
        .with_logger(Box::new(ConsoleLogger::new()));

    let pb = ProgressBar::new(config.total_samples as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}")?
            .progress_chars("#>-"),
    );
    let start = std::time::Instant::now();
    let paths = collector.run_with_progress(config.total_samples, args.random, |n| {
        pb.set_position(n as u64)
    })?;
    pb.finish_with_message("Collection complete");

    if paths.is_empty() {
        tracing::warn!("No paths collected");
    } else {
        let batch = ReturnsProcessor::new(config.discount).process(&paths)?;
        tracing::info!(
            paths = paths.len(),
            samples = %abbreviate(batch.len() as u64),
            mean_return = batch.mean_path_return(),
            elapsed = %format_duration(start.elapsed().as_secs_f64()),
            "Collection summary"
        );
    }

    if let Some(output) = output {
        let file = File::create(output)
            .with_context(|| format!("creating {}", output.display()))?;
        serde_json::to_writer(BufWriter::new(file), &paths)?;
        tracing::info!(path = %output.display(), "Saved paths");
    }
    Ok(())
}

fn eval(
    config: &ExperimentConfig,
    args: &ExperimentArgs,
    schedule: &TargetSchedule,
    eval_config: &EvalConfig,
) -> Result<()> {
    let mut env = make_env(config)?;
    let shape = config.history_shape(
        env.observation_space().dim(),
        env.action_space().dim(),
    )?;
    let mut policy = build_policy(config, args, env.action_space(), shape)?;

    let paths = evaluate(env.as_mut(), policy.as_mut(), shape, schedule, eval_config)?;
    let mean_return = paths.iter().map(|p| p.total_reward()).sum::<f32>() / paths.len().max(1) as f32;
    let mean_length = paths.iter().map(|p| p.len()).sum::<usize>() as f32 / paths.len().max(1) as f32;
    tracing::info!(
        episodes = paths.len(),
        mean_return,
        mean_length,
        "Evaluation complete"
    );
    env.close();
    Ok(())
}

fn list_envs() {
    println!("Available environments:");
    println!();
    for (name, description) in ENV_NAMES {
        println!("  {name:<12} {description}");
    }
    println!();
    println!("Collect with `quadmpc collect --env <name>`, evaluate with `quadmpc eval`.");
}
