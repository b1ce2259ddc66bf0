//! Dynamics model trait and the normalization glue around inference.

use super::Normalization;
use crate::history::{BatchedStackedHistory, HistoryShape};
use crate::{QuadError, Result};
use ndarray::{Array2, ArrayView2};
use serde::{Deserialize, Serialize};

/// What the model output represents.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PredictionTarget {
    /// Change from the newest stacked state
    #[default]
    Delta,
    /// The next state itself
    NextState,
}

/// Learned transition model over flattened stacked histories.
///
/// Implementations see inputs that are already normalized with
/// `input_normalization()`; one row per candidate, `shape().flat_width()`
/// columns. `predict` must return `(rows, state_dim)`.
pub trait DynamicsModel: Send + Sync {
    /// History dimensions the model was built for
    fn shape(&self) -> HistoryShape;

    fn target(&self) -> PredictionTarget {
        PredictionTarget::Delta
    }

    /// Input statistics; `None` until set after training
    fn input_normalization(&self) -> Option<&Normalization>;

    /// Output statistics, inverted after inference when present
    fn output_normalization(&self) -> Option<&Normalization> {
        None
    }

    /// Batched forward pass on normalized inputs
    fn predict(&self, inputs: ArrayView2<f32>) -> Result<Array2<f32>>;
}

impl<M: DynamicsModel + ?Sized> DynamicsModel for Box<M> {
    fn shape(&self) -> HistoryShape {
        (**self).shape()
    }

    fn target(&self) -> PredictionTarget {
        (**self).target()
    }

    fn input_normalization(&self) -> Option<&Normalization> {
        (**self).input_normalization()
    }

    fn output_normalization(&self) -> Option<&Normalization> {
        (**self).output_normalization()
    }

    fn predict(&self, inputs: ArrayView2<f32>) -> Result<Array2<f32>> {
        (**self).predict(inputs)
    }
}

/// Predict the next state of every row of `history` with one model call.
///
/// Normalizes the flattened batch, runs inference, undoes output
/// normalization and, for delta models, adds the newest stacked state.
pub fn predict_next_states<M: DynamicsModel + ?Sized>(
    model: &M,
    history: &BatchedStackedHistory,
) -> Result<Array2<f32>> {
    let shape = model.shape();
    if history.shape() != shape {
        return Err(QuadError::ShapeMismatch {
            expected: shape.as_vec(),
            actual: history.shape().as_vec(),
        });
    }
    let input_norm = model
        .input_normalization()
        .ok_or(QuadError::NormalizationUnavailable)?;

    let inputs = input_norm.normalize(history.flattened().view())?;
    let mut out = model.predict(inputs.view())?;
    if out.dim() != (history.num_parallel(), shape.state_dim) {
        return Err(QuadError::ShapeMismatch {
            expected: vec![history.num_parallel(), shape.state_dim],
            actual: out.shape().to_vec(),
        });
    }
    if let Some(output_norm) = model.output_normalization() {
        out = output_norm.denormalize(out.view())?;
    }
    if model.target() == PredictionTarget::Delta {
        out += &history.last_states();
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::StackedHistory;
    use ndarray::{array, s};

    /// Returns the newest stacked action, padded/truncated to the state width.
    struct NewestAction {
        shape: HistoryShape,
        norm: Option<Normalization>,
        target: PredictionTarget,
    }

    impl DynamicsModel for NewestAction {
        fn shape(&self) -> HistoryShape {
            self.shape
        }
        fn target(&self) -> PredictionTarget {
            self.target
        }
        fn input_normalization(&self) -> Option<&Normalization> {
            self.norm.as_ref()
        }
        fn predict(&self, inputs: ArrayView2<f32>) -> Result<Array2<f32>> {
            let start = self.shape.flat_width() - self.shape.action_dim;
            Ok(inputs.slice(s![.., start..]).to_owned())
        }
    }

    fn history(shape: HistoryShape) -> BatchedStackedHistory {
        let mut single = StackedHistory::new(shape, Some(array![5.0].view()), None).unwrap();
        single.push_action(array![2.0].view()).unwrap();
        BatchedStackedHistory::broadcast(&single, 2).unwrap()
    }

    #[test]
    fn test_delta_is_added_to_last_state() {
        let shape = HistoryShape::new(1, 1, 2).unwrap();
        let model = NewestAction {
            shape,
            norm: Some(Normalization::identity(shape.flat_width())),
            target: PredictionTarget::Delta,
        };
        let next = predict_next_states(&model, &history(shape)).unwrap();
        assert_eq!(next, array![[7.0f32], [7.0]]);
    }

    #[test]
    fn test_next_state_target_and_normalization() {
        let shape = HistoryShape::new(1, 1, 2).unwrap();
        let mut norm = Normalization::identity(shape.flat_width());
        norm.std.fill(2.0);
        let model = NewestAction {
            shape,
            norm: Some(norm),
            target: PredictionTarget::NextState,
        };
        let next = predict_next_states(&model, &history(shape)).unwrap();
        assert_eq!(next, array![[1.0f32], [1.0]]);
    }

    #[test]
    fn test_missing_normalization() {
        let shape = HistoryShape::new(1, 1, 2).unwrap();
        let model = NewestAction {
            shape,
            norm: None,
            target: PredictionTarget::Delta,
        };
        assert!(matches!(
            predict_next_states(&model, &history(shape)),
            Err(QuadError::NormalizationUnavailable)
        ));
    }
}
