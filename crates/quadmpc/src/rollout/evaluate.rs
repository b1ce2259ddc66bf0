//! Closed-loop evaluation rollouts on a single environment.

use super::path::{Path, RunningPath};
use crate::env::{InitialPose, QuadEnv};
use crate::history::{HistoryShape, StackedHistory};
use crate::planner::Policy;
use crate::{QuadError, Result};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fs;

/// Goal position as a function of the step index.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TargetSchedule {
    /// Same point for the whole episode
    Fixed { point: Vec<f32> },
    /// `first` until `switch_step`, then `second`
    Stepped {
        first: Vec<f32>,
        second: Vec<f32>,
        switch_step: usize,
    },
    /// One point per step; the last point holds once the list runs out
    Trajectory { points: Vec<Vec<f32>> },
}

impl Default for TargetSchedule {
    /// Hover at (0.8, 0.8, 0.8), then return to the origin at step 120.
    fn default() -> Self {
        TargetSchedule::Stepped {
            first: vec![0.8; 3],
            second: vec![0.0; 3],
            switch_step: 120,
        }
    }
}

impl TargetSchedule {
    pub fn fixed(point: Array1<f32>) -> Self {
        TargetSchedule::Fixed {
            point: point.to_vec(),
        }
    }

    /// Rows of `points` are consecutive goals.
    pub fn trajectory(points: Array2<f32>) -> Self {
        TargetSchedule::Trajectory {
            points: points.outer_iter().map(|p| p.to_vec()).collect(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        let empty = match self {
            TargetSchedule::Fixed { point } => point.is_empty(),
            TargetSchedule::Stepped { first, second, .. } => {
                if first.len() != second.len() {
                    return Err(QuadError::length(first.len(), second.len()));
                }
                first.is_empty()
            }
            TargetSchedule::Trajectory { points } => {
                let dim = points.first().map(Vec::len).unwrap_or(0);
                if let Some(bad) = points.iter().find(|p| p.len() != dim) {
                    return Err(QuadError::length(dim, bad.len()));
                }
                dim == 0
            }
        };
        if empty {
            return Err(QuadError::Config("target schedule has no points".into()));
        }
        Ok(())
    }

    pub fn target_at(&self, step: usize) -> Array1<f32> {
        let point = match self {
            TargetSchedule::Fixed { point } => point,
            TargetSchedule::Stepped {
                first,
                second,
                switch_step,
            } => {
                if step < *switch_step {
                    first
                } else {
                    second
                }
            }
            TargetSchedule::Trajectory { points } => {
                let idx = step.min(points.len().saturating_sub(1));
                match points.get(idx) {
                    Some(p) => p,
                    None => return Array1::zeros(0),
                }
            }
        };
        Array1::from(point.clone())
    }

    /// Goal handed to the environment and policy while acting at `step`.
    ///
    /// Trajectories lead by one point; other schedules match `target_at`.
    pub fn lookahead_target(&self, step: usize) -> Array1<f32> {
        match self {
            TargetSchedule::Trajectory { .. } => self.target_at(step + 1),
            _ => self.target_at(step),
        }
    }
}

/// Evaluation rollout settings
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct EvalConfig {
    pub episodes: usize,
    pub max_path_length: usize,
    /// Stride between stacked entries; 1 keeps consecutive steps
    pub proportion: usize,
    /// Ignore `done` and always run `max_path_length` steps
    pub run_all_steps: bool,
    /// Start pose; random when unset
    #[serde(skip)]
    pub initial_pose: Option<InitialPose>,
    /// Write `paths.json` here after every episode
    pub save_dir: Option<std::path::PathBuf>,
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            episodes: 20,
            max_path_length: 250,
            proportion: 1,
            run_all_steps: false,
            initial_pose: None,
            save_dir: None,
        }
    }
}

/// Bounded step memory used for strided history stacking.
struct StrideWindow {
    stack_n: usize,
    proportion: usize,
    states: VecDeque<Array1<f32>>,
    actions: VecDeque<Array1<f32>>,
}

impl StrideWindow {
    fn new(stack_n: usize, proportion: usize) -> Self {
        let capacity = (stack_n - 1) * proportion + 1;
        Self {
            stack_n,
            proportion,
            states: VecDeque::with_capacity(capacity),
            actions: VecDeque::with_capacity(capacity),
        }
    }

    fn capacity(&self) -> usize {
        (self.stack_n - 1) * self.proportion + 1
    }

    fn is_full(&self) -> bool {
        self.states.len() >= self.capacity()
    }

    fn push(queue: &mut VecDeque<Array1<f32>>, value: Array1<f32>, capacity: usize) {
        if queue.len() == capacity {
            queue.pop_front();
        }
        queue.push_back(value);
    }

    fn push_action(&mut self, action: Array1<f32>) {
        let capacity = self.capacity();
        Self::push(&mut self.actions, action, capacity);
    }

    fn push_state(&mut self, state: Array1<f32>) {
        let capacity = self.capacity();
        Self::push(&mut self.states, state, capacity);
    }

    /// Every `proportion`-th recorded entry, oldest first.
    fn strided(&self) -> Result<(Array2<f32>, Array2<f32>)> {
        let pick = |queue: &VecDeque<Array1<f32>>| -> Result<Array2<f32>> {
            let dim = queue.front().map(Array1::len).unwrap_or(0);
            let mut out = Array2::zeros((self.stack_n, dim));
            for (i, mut row) in out.rows_mut().into_iter().enumerate() {
                let entry = queue
                    .get(i * self.proportion)
                    .ok_or_else(|| QuadError::InvalidHistory("stride window not full".into()))?;
                row.assign(entry);
            }
            Ok(out)
        };
        Ok((pick(&self.states)?, pick(&self.actions)?))
    }
}

/// Run `config.episodes` closed-loop episodes with `policy`.
///
/// Both the environment and the policy follow `schedule`. Paths carry the
/// goal active at each step in `targets`.
pub fn evaluate<E, P>(
    env: &mut E,
    policy: &mut P,
    shape: HistoryShape,
    schedule: &TargetSchedule,
    config: &EvalConfig,
) -> Result<Vec<Path>>
where
    E: QuadEnv + ?Sized,
    P: Policy + ?Sized,
{
    schedule.validate()?;
    if config.proportion == 0 {
        return Err(QuadError::Config("proportion must be positive".into()));
    }
    if let Some(dir) = &config.save_dir {
        if dir.join("paths.json").exists() {
            return Err(QuadError::Config(format!(
                "{} already holds saved paths",
                dir.display()
            )));
        }
        fs::create_dir_all(dir)?;
    }
    tracing::info!(
        episodes = config.episodes,
        fixed_start = config.initial_pose.is_some(),
        run_all_steps = config.run_all_steps,
        "Starting evaluation"
    );

    let mut paths = Vec::with_capacity(config.episodes);
    for episode in 0..config.episodes {
        let path = run_episode(env, policy, shape, schedule, config)?;
        tracing::info!(
            episode = episode + 1,
            ret = path.total_reward(),
            steps = path.len(),
            "Evaluation episode finished"
        );
        paths.push(path);

        if let Some(dir) = &config.save_dir {
            fs::write(dir.join("paths.json"), serde_json::to_vec(&paths)?)?;
        }
    }
    Ok(paths)
}

fn run_episode<E, P>(
    env: &mut E,
    policy: &mut P,
    shape: HistoryShape,
    schedule: &TargetSchedule,
    config: &EvalConfig,
) -> Result<Path>
where
    E: QuadEnv + ?Sized,
    P: Policy + ?Sized,
{
    let first_target = schedule.lookahead_target(0);
    env.set_target_position(first_target.view())?;
    let (obs, _) = env.reset(config.initial_pose.as_ref())?;

    let mut history = StackedHistory::new(shape, Some(obs.view()), None)?;
    let mut window = StrideWindow::new(shape.stack_n, config.proportion);
    let mut running = RunningPath::new(shape);

    let mut done = false;
    let mut step = 0;
    while !done && step < config.max_path_length {
        let target = schedule.lookahead_target(step);
        env.set_target_position(target.view())?;
        policy.set_target(target.view())?;

        if window.is_full() {
            let (states, actions) = window.strided()?;
            history.fill_from(states.view(), actions.view())?;
        }
        let action = policy.act(&history)?;
        let result = env.step(action.view())?;
        done = result.done() && !config.run_all_steps;

        history.push_action(action.view())?;
        running.push(
            &history,
            result.reward,
            done,
            result.observation.view(),
            Some(target.view()),
        )?;
        history.push_state(result.observation.view())?;

        window.push_action(action);
        window.push_state(result.observation);
        step += 1;
    }
    running.freeze()
}
