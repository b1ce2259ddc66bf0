//! Random-shooting model predictive control.

use super::{ActionSampler, PlannerConfig, Policy};
use crate::dynamics::{predict_next_states, DynamicsModel};
use crate::history::{BatchedStackedHistory, HistoryShape, StackedHistory};
use crate::reward::RewardFn;
use crate::spaces::Box as BoxSpace;
use crate::utils::{argmax, seeded_rng};
use crate::{QuadError, Result};
use ndarray::{s, Array1, ArrayView1, ArrayView3, Axis};
use rand::rngs::StdRng;
use rand::Rng;

/// Planner that scores random action sequences with a learned dynamics model.
///
/// Every call broadcasts the current history to `candidates` rows, rolls all
/// candidates forward together (one model call per timestep), and returns the
/// first action of the sequence with the highest discounted reward.
pub struct RandomShooter<M: DynamicsModel, R: RewardFn> {
    config: PlannerConfig,
    sampler: ActionSampler,
    model: M,
    reward: R,
    rng: StdRng,
}

impl<M: DynamicsModel, R: RewardFn> RandomShooter<M, R> {
    pub fn new(config: PlannerConfig, action_space: BoxSpace, model: M, reward: R) -> Result<Self> {
        config.validate()?;
        let shape = model.shape();
        if action_space.dim() != shape.action_dim {
            return Err(QuadError::Config(format!(
                "action space has {} dims but the model expects {}",
                action_space.dim(),
                shape.action_dim
            )));
        }
        let sampler = ActionSampler::new(action_space, config.sampler)?;
        let rng = seeded_rng(config.seed);
        Ok(Self {
            config,
            sampler,
            model,
            reward,
            rng,
        })
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    pub fn sampler(&self) -> &ActionSampler {
        &self.sampler
    }

    pub fn shape(&self) -> HistoryShape {
        self.model.shape()
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn model_mut(&mut self) -> &mut M {
        &mut self.model
    }

    pub fn reward_fn(&self) -> &R {
        &self.reward
    }

    pub fn reward_fn_mut(&mut self) -> &mut R {
        &mut self.reward
    }

    /// Plan with the planner's own generator.
    pub fn get_action(&mut self, history: &StackedHistory) -> Result<Array1<f32>> {
        let mut rng = self.rng.clone();
        let action = self.get_action_with_rng(history, &mut rng);
        self.rng = rng;
        action
    }

    /// Plan with a caller-supplied generator. `history` is left untouched.
    pub fn get_action_with_rng<G: Rng>(
        &self,
        history: &StackedHistory,
        rng: &mut G,
    ) -> Result<Array1<f32>> {
        self.check_history(history)?;
        let actions = self
            .sampler
            .sample(rng, self.config.horizon, self.config.candidates);
        let totals = self.score_sequences(history, actions.view())?;

        let best = argmax(totals.view())
            .ok_or_else(|| QuadError::Config("planner has no candidates".into()))?;
        tracing::debug!(best, score = totals[best], "Planned action");
        Ok(actions.slice(s![0, best, ..]).to_owned())
    }

    /// Discounted reward of each candidate sequence.
    ///
    /// `actions` is `(horizon, candidates, action_dim)`. At each timestep the
    /// candidate actions enter the action stack first, then the model predicts
    /// the next states which are scored and pushed onto the state stack.
    pub fn score_sequences(
        &self,
        history: &StackedHistory,
        actions: ArrayView3<f32>,
    ) -> Result<Array1<f32>> {
        self.check_history(history)?;
        let (horizon, candidates, action_dim) = actions.dim();
        if action_dim != self.shape().action_dim || candidates == 0 {
            return Err(QuadError::ShapeMismatch {
                expected: vec![horizon, candidates.max(1), self.shape().action_dim],
                actual: actions.shape().to_vec(),
            });
        }

        let mut batch = BatchedStackedHistory::broadcast(history, candidates)?;
        let mut totals = Array1::<f32>::zeros(candidates);
        let mut weight = 1.0f32;
        for step_actions in actions.axis_iter(Axis(0)) {
            batch.slide(Some(step_actions), None)?;
            let next_states = predict_next_states(&self.model, &batch)?;
            batch.slide(None, Some(next_states.view()))?;
            let rewards = self.reward.reward(next_states.view());
            totals.scaled_add(weight, &rewards);
            weight *= self.config.discount;
        }
        Ok(totals)
    }

    fn check_history(&self, history: &StackedHistory) -> Result<()> {
        let expected = self.shape();
        let actual = history.shape();
        if actual != expected {
            return Err(QuadError::InvalidHistory(format!(
                "planner expects {:?}, got {:?}",
                expected, actual
            )));
        }
        Ok(())
    }
}

impl<M: DynamicsModel, R: RewardFn> Policy for RandomShooter<M, R> {
    fn act(&mut self, history: &StackedHistory) -> Result<Array1<f32>> {
        self.get_action(history)
    }

    fn set_target(&mut self, target: ArrayView1<f32>) -> Result<()> {
        self.reward.set_target(target)
    }
}
