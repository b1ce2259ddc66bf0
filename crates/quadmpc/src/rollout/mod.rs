//! Rollouts: training-data collection over vectorized environments and
//! closed-loop evaluation on a single environment.

mod collector;
mod evaluate;
mod path;

pub use collector::{CancelToken, CollectorConfig, RolloutCollector};
pub use evaluate::{evaluate, EvalConfig, TargetSchedule};
pub use path::{Path, RunningPath};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::ReturnsProcessor;
    use crate::env::{EnvInfo, EpisodeStats, InitialPose, QuadEnv, StepResult};
    use crate::history::{HistoryShape, StackedHistory};
    use crate::log::RecordingLogger;
    use crate::planner::Policy;
    use crate::spaces::Box as BoxSpace;
    use crate::vector::{Serial, VecEnv, VecEnvBackend, VecStepResult};
    use crate::{QuadError, Result};
    use ndarray::{array, Array1, Array2, ArrayView1, ArrayView2};
    use std::sync::Arc;

    /// 2-D point pushed by its action; done once it leaves the unit box
    /// scaled by `limit`.
    struct Drift {
        pos: Array1<f32>,
        target: Array1<f32>,
        limit: f32,
        resets: usize,
    }

    impl Drift {
        fn new(limit: f32) -> Self {
            Self {
                pos: Array1::zeros(2),
                target: Array1::zeros(2),
                limit,
                resets: 0,
            }
        }
    }

    impl QuadEnv for Drift {
        fn observation_space(&self) -> BoxSpace {
            BoxSpace::unbounded(2)
        }
        fn action_space(&self) -> BoxSpace {
            BoxSpace::uniform(2, -1.0, 1.0)
        }
        fn reset(&mut self, pose: Option<&InitialPose>) -> Result<(Array1<f32>, EnvInfo)> {
            self.resets += 1;
            self.pos = match pose {
                Some(p) => p.position.slice(ndarray::s![..2]).to_owned(),
                None => Array1::zeros(2),
            };
            Ok((self.pos.clone(), EnvInfo::new()))
        }
        fn step(&mut self, action: ArrayView1<f32>) -> Result<StepResult> {
            self.pos += &action;
            let diff = &self.pos - &self.target;
            Ok(StepResult {
                observation: self.pos.clone(),
                reward: -diff.dot(&diff).sqrt(),
                terminated: self.pos.iter().any(|v| v.abs() > self.limit),
                truncated: false,
                info: EnvInfo::new(),
            })
        }
        fn set_target_position(&mut self, target: ArrayView1<f32>) -> Result<()> {
            self.target.assign(&target);
            Ok(())
        }
        fn target_position(&self) -> Option<Array1<f32>> {
            Some(self.target.clone())
        }
    }

    /// Always pushes by a constant, remembers the last target it was given.
    struct Constant {
        action: Array1<f32>,
        target: Option<Array1<f32>>,
        calls: usize,
    }

    impl Policy for Constant {
        fn act(&mut self, _history: &StackedHistory) -> Result<Array1<f32>> {
            self.calls += 1;
            Ok(self.action.clone())
        }
        fn set_target(&mut self, target: ArrayView1<f32>) -> Result<()> {
            self.target = Some(target.to_owned());
            Ok(())
        }
    }

    fn constant(x: f32) -> Constant {
        Constant {
            action: array![x, 0.0],
            target: None,
            calls: 0,
        }
    }

    fn collector(
        limit: f32,
        max_path_length: usize,
    ) -> RolloutCollector<VecEnv<Serial<Drift>>, Constant> {
        let env = VecEnv::from_backend(Serial::new(|| Drift::new(limit), 3).unwrap());
        let config = CollectorConfig {
            max_path_length,
            stack_n: 3,
            seed: Some(4),
        };
        RolloutCollector::new(env, constant(0.5), config).unwrap()
    }

    #[test]
    fn test_run_meets_sample_budget() {
        let mut collector = collector(100.0, 7);
        let paths = collector.run(40, true).unwrap();
        let total: usize = paths.iter().map(Path::len).sum();
        assert!(total >= 40);
        for path in &paths {
            assert!(path.len() <= 7);
            assert!(path.ends_with_done() || path.len() == 7);
            assert_eq!(path.observations.dim(), (path.len(), 6));
            assert_eq!(path.actions.dim(), (path.len(), 6));
            assert!(path.actions.iter().all(|a| (-1.0..=1.0).contains(a)));
        }
    }

    #[test]
    fn test_paths_end_on_done() {
        // 0.5 per step past a limit of 1.2: done at step 3.
        let mut collector = collector(1.2, 50);
        let paths = collector.run(9, false).unwrap();
        assert_eq!(paths.len(), 3);
        for path in &paths {
            assert_eq!(path.len(), 3);
            assert_eq!(path.dones, vec![false, false, true]);
            assert_eq!(path.next_obs.column(0).to_vec(), vec![0.5f32, 1.0, 1.5]);
            assert!(path.delta_obs.column(0).iter().all(|&d| d == 0.5));
        }
        // Slot histories restart from the reset observation.
        let last = &paths[0];
        assert_eq!(last.observations.row(0).to_vec(), vec![0.0f32; 6]);
        assert_eq!(last.actions.row(0).to_vec(), vec![0.0f32, 0.0, 0.0, 0.0, 0.5, 0.0]);
        assert_eq!(
            last.observations.row(2).to_vec(),
            vec![0.0f32, 0.0, 0.5, 0.0, 1.0, 0.0]
        );
    }

    #[test]
    fn test_zero_budget_is_empty() {
        let mut collector = collector(1.2, 5);
        assert!(collector.run(0, false).unwrap().is_empty());
        assert_eq!(collector.policy().calls, 0);
    }

    #[test]
    fn test_cancel_returns_completed_paths() {
        let mut collector = collector(100.0, 5);
        let token = collector.cancel_token();
        token.cancel();
        assert!(collector.run(100, true).unwrap().is_empty());
        token.reset();
        assert!(!collector.run(5, true).unwrap().is_empty());
    }

    #[test]
    fn test_cancel_from_progress_keeps_finished_paths() {
        // (limit, max_path_length): paths end on done, then on the length cut.
        for (limit, max_path_length) in [(1.2, 50), (100.0, 4)] {
            let mut collector = collector(limit, max_path_length);
            let token = collector.cancel_token();
            let paths = collector
                .run_with_progress(100, false, |_| token.cancel())
                .unwrap();
            assert!(!paths.is_empty());
            for path in &paths {
                assert!(path.ends_with_done() || path.len() == max_path_length);
            }
            let total: usize = paths.iter().map(Path::len).sum();
            assert!(total < 100);
            // Every slot finished on the same step, so no further step ran.
            assert_eq!(paths.len(), 3);
            assert_eq!(collector.total_steps() as usize, paths[0].len());
        }
    }

    /// Reports `num_envs` slots but drops a row from `reset` or `step`.
    struct ShortBackend {
        short_reset: bool,
    }

    impl VecEnvBackend for ShortBackend {
        fn observation_space(&self) -> BoxSpace {
            BoxSpace::unbounded(2)
        }
        fn action_space(&self) -> BoxSpace {
            BoxSpace::uniform(2, -1.0, 1.0)
        }
        fn num_envs(&self) -> usize {
            2
        }
        fn reset(&mut self, _seed: Option<u64>) -> Result<(Array2<f32>, Vec<EnvInfo>)> {
            let rows = if self.short_reset { 1 } else { 2 };
            Ok((Array2::zeros((rows, 2)), vec![EnvInfo::new(); rows]))
        }
        fn reset_slot(&mut self, _slot: usize, _pose: Option<&InitialPose>) -> Result<Array1<f32>> {
            Ok(Array1::zeros(2))
        }
        fn step(&mut self, _actions: ArrayView2<f32>) -> Result<VecStepResult> {
            Ok(VecStepResult {
                observations: Array2::zeros((1, 2)),
                rewards: vec![0.0],
                terminated: vec![false],
                truncated: vec![false],
                infos: vec![EnvInfo::new()],
            })
        }
        fn set_target_position(&mut self, _target: ArrayView1<f32>) -> Result<()> {
            Ok(())
        }
        fn close(&mut self) {}
    }

    #[test]
    fn test_short_backend_batch_is_step_error() {
        for short_reset in [true, false] {
            let config = CollectorConfig {
                max_path_length: 5,
                stack_n: 2,
                seed: None,
            };
            let mut collector =
                RolloutCollector::new(ShortBackend { short_reset }, constant(0.5), config).unwrap();
            match collector.run(10, true) {
                Err(QuadError::EnvironmentStep(msg)) => {
                    let stage = if short_reset { "reset" } else { "step" };
                    assert!(msg.contains(stage), "{msg}");
                }
                other => panic!("expected a step error, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_episode_stats_logged() {
        let logger = Arc::new(RecordingLogger::new());
        let env = VecEnv::from_backend(
            Serial::new(|| EpisodeStats::new(Drift::new(1.2)), 3).unwrap(),
        );
        let config = CollectorConfig {
            max_path_length: 50,
            stack_n: 2,
            seed: None,
        };
        let mut collector = RolloutCollector::new(env, constant(0.5), config)
            .unwrap()
            .with_logger(Box::new(Arc::clone(&logger)));
        let paths = collector.run(9, false).unwrap();

        assert_eq!(logger.values("episode/length"), vec![3.0, 3.0, 3.0]);
        let returns = logger.values("episode/return");
        assert_eq!(returns.len(), 3);
        for (ret, path) in returns.iter().zip(&paths) {
            assert!((*ret as f32 - path.total_reward()).abs() < 1e-5);
        }
    }

    #[test]
    fn test_length_cut_reports_no_episode_stats() {
        let logger = Arc::new(RecordingLogger::new());
        let env = VecEnv::from_backend(
            Serial::new(|| EpisodeStats::new(Drift::new(100.0)), 2).unwrap(),
        );
        let config = CollectorConfig {
            max_path_length: 3,
            stack_n: 1,
            seed: None,
        };
        let mut collector = RolloutCollector::new(env, constant(0.5), config)
            .unwrap()
            .with_logger(Box::new(Arc::clone(&logger)));
        collector.run(6, false).unwrap();
        assert!(logger.values("episode/return").is_empty());
        assert_eq!(logger.values("path/length"), vec![3.0, 3.0]);
    }

    #[test]
    fn test_metrics_logged() {
        let logger = Arc::new(RecordingLogger::new());
        let mut collector = collector(1.2, 50).with_logger(Box::new(Arc::clone(&logger)));
        collector.run(3, false).unwrap();
        assert_eq!(logger.values("path/length"), vec![3.0, 3.0, 3.0]);
        assert_eq!(logger.values("collect/samples"), vec![9.0]);
        assert_eq!(logger.values("path/return").len(), 3);
    }

    #[test]
    fn test_collect_and_process() {
        let mut collector = collector(1.2, 50);
        let batch = collector
            .collect_and_process(6, false, &ReturnsProcessor::new(0.5))
            .unwrap();
        assert_eq!(batch.len(), 9);
        assert_eq!(batch.inputs.ncols(), 12);
    }

    #[test]
    fn test_evaluate_follows_schedule() {
        let shape = HistoryShape::new(2, 2, 2).unwrap();
        let mut env = Drift::new(100.0);
        let mut policy = constant(0.1);
        let schedule = TargetSchedule::Stepped {
            first: vec![1.0, 1.0],
            second: vec![0.0, 0.0],
            switch_step: 3,
        };
        let config = EvalConfig {
            episodes: 2,
            max_path_length: 5,
            ..Default::default()
        };
        let paths = evaluate(&mut env, &mut policy, shape, &schedule, &config).unwrap();
        assert_eq!(paths.len(), 2);
        assert_eq!(env.resets, 2);
        let targets = paths[0].targets.as_ref().unwrap();
        assert_eq!(targets.column(0).to_vec(), vec![1.0f32, 1.0, 1.0, 0.0, 0.0]);
        assert_eq!(policy.target, Some(array![0.0f32, 0.0]));
    }

    #[test]
    fn test_evaluate_trajectory_leads_by_one_point() {
        let shape = HistoryShape::new(2, 2, 1).unwrap();
        let mut env = Drift::new(100.0);
        let mut policy = constant(0.1);
        let schedule = TargetSchedule::trajectory(array![[1.0f32, 0.0], [2.0, 0.0], [3.0, 0.0]]);
        let config = EvalConfig {
            episodes: 1,
            max_path_length: 4,
            ..Default::default()
        };
        let paths = evaluate(&mut env, &mut policy, shape, &schedule, &config).unwrap();
        let targets = paths[0].targets.as_ref().unwrap();
        assert_eq!(targets.column(0).to_vec(), vec![2.0f32, 3.0, 3.0, 3.0]);
        assert_eq!(env.target_position(), Some(array![3.0f32, 0.0]));
        // Rewards are scored against the led target.
        let first = paths[0].next_obs.row(0).to_owned();
        let expected = -((first[0] - 2.0).powi(2) + first[1].powi(2)).sqrt();
        assert!((paths[0].rewards[0] - expected).abs() < 1e-6);

        let fixed = TargetSchedule::fixed(array![1.0, 0.0]);
        assert_eq!(fixed.lookahead_target(5), fixed.target_at(5));
        let stepped = TargetSchedule::default();
        assert_eq!(stepped.lookahead_target(119), stepped.target_at(119));
    }

    #[test]
    fn test_evaluate_run_all_steps() {
        let shape = HistoryShape::new(2, 2, 2).unwrap();
        let mut env = Drift::new(0.25);
        let mut policy = constant(0.2);
        let schedule = TargetSchedule::fixed(array![0.0, 0.0]);
        let early = EvalConfig {
            episodes: 1,
            max_path_length: 10,
            ..Default::default()
        };
        let paths = evaluate(&mut env, &mut policy, shape, &schedule, &early).unwrap();
        assert_eq!(paths[0].len(), 2);

        let all = EvalConfig {
            run_all_steps: true,
            ..early
        };
        let paths = evaluate(&mut env, &mut policy, shape, &schedule, &all).unwrap();
        assert_eq!(paths[0].len(), 10);
        assert!(paths[0].dones.iter().all(|d| !d));
    }

    #[test]
    fn test_evaluate_strided_history() {
        // stack_n = 2, proportion = 2: once three steps are recorded the
        // history holds entries two steps apart.
        let shape = HistoryShape::new(2, 2, 2).unwrap();
        let mut env = Drift::new(100.0);
        let mut policy = constant(1.0);
        let config = EvalConfig {
            episodes: 1,
            max_path_length: 5,
            proportion: 2,
            ..Default::default()
        };
        let schedule = TargetSchedule::fixed(array![0.0, 0.0]);
        let paths = evaluate(&mut env, &mut policy, shape, &schedule, &config).unwrap();
        let obs = &paths[0].observations;
        // Step 3 plans from the states at x = 1 and x = 3.
        assert_eq!(obs.row(3).to_vec(), vec![1.0f32, 0.0, 3.0, 0.0]);
        // Consecutive steps before the window fills.
        assert_eq!(obs.row(1).to_vec(), vec![0.0f32, 0.0, 1.0, 0.0]);
    }

    #[test]
    fn test_evaluate_saves_paths() {
        let dir = tempfile::tempdir().unwrap();
        let shape = HistoryShape::new(2, 2, 1).unwrap();
        let mut env = Drift::new(100.0);
        let mut policy = constant(0.1);
        let config = EvalConfig {
            episodes: 2,
            max_path_length: 3,
            save_dir: Some(dir.path().to_path_buf()),
            ..Default::default()
        };
        let schedule = TargetSchedule::fixed(array![0.0, 0.0]);
        evaluate(&mut env, &mut policy, shape, &schedule, &config).unwrap();
        let saved: Vec<Path> =
            serde_json::from_slice(&std::fs::read(dir.path().join("paths.json")).unwrap()).unwrap();
        assert_eq!(saved.len(), 2);
        // A second run refuses to overwrite.
        assert!(evaluate(&mut env, &mut policy, shape, &schedule, &config).is_err());
    }
}
