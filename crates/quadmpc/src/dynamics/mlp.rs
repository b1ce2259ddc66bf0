//! Inference-only multilayer perceptron dynamics.
//!
//! Weights come from a training pipeline outside this crate (or a fresh
//! random initialization for data collection before the first fit).

use super::{DynamicsModel, Normalization, PredictionTarget};
use crate::history::HistoryShape;
use crate::{QuadError, Result};
use ndarray::{Array1, Array2, ArrayView2};
use rand::Rng;
use rand_distr::{Distribution, Uniform};
use serde::{Deserialize, Serialize};

/// Fully connected layer, `y = x · weight + bias`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DenseLayer {
    /// `(inputs, outputs)`
    pub weight: Array2<f32>,
    pub bias: Array1<f32>,
}

impl DenseLayer {
    /// Glorot-uniform weights, zero bias.
    pub fn random<R: Rng>(inputs: usize, outputs: usize, rng: &mut R) -> Self {
        let limit = (6.0 / (inputs + outputs) as f32).sqrt();
        let dist = Uniform::new_inclusive(-limit, limit);
        Self {
            weight: Array2::from_shape_fn((inputs, outputs), |_| dist.sample(rng)),
            bias: Array1::zeros(outputs),
        }
    }

    pub fn inputs(&self) -> usize {
        self.weight.nrows()
    }

    pub fn outputs(&self) -> usize {
        self.weight.ncols()
    }

    fn forward(&self, x: ArrayView2<f32>) -> Array2<f32> {
        x.dot(&self.weight) + &self.bias
    }
}

/// ReLU MLP mapping a normalized stacked history to the next state (or delta).
#[derive(Clone, Debug)]
pub struct MlpDynamics {
    shape: HistoryShape,
    target: PredictionTarget,
    layers: Vec<DenseLayer>,
    input_norm: Option<Normalization>,
    output_norm: Option<Normalization>,
}

impl MlpDynamics {
    /// Randomly initialized network with the given hidden layer widths.
    pub fn new<R: Rng>(
        shape: HistoryShape,
        hidden_layers: &[usize],
        target: PredictionTarget,
        rng: &mut R,
    ) -> Self {
        let mut widths = Vec::with_capacity(hidden_layers.len() + 2);
        widths.push(shape.flat_width());
        widths.extend_from_slice(hidden_layers);
        widths.push(shape.state_dim);

        let layers = widths
            .windows(2)
            .map(|w| DenseLayer::random(w[0], w[1], rng))
            .collect();

        Self {
            shape,
            target,
            layers,
            input_norm: None,
            output_norm: None,
        }
    }

    /// Build from existing layers, checking that widths chain correctly.
    pub fn from_layers(
        shape: HistoryShape,
        target: PredictionTarget,
        layers: Vec<DenseLayer>,
    ) -> Result<Self> {
        let mut width = shape.flat_width();
        for layer in &layers {
            if layer.inputs() != width || layer.bias.len() != layer.outputs() {
                return Err(QuadError::ShapeMismatch {
                    expected: vec![width, layer.outputs()],
                    actual: vec![layer.inputs(), layer.bias.len()],
                });
            }
            width = layer.outputs();
        }
        if layers.is_empty() || width != shape.state_dim {
            return Err(QuadError::ShapeMismatch {
                expected: vec![shape.state_dim],
                actual: vec![width],
            });
        }
        Ok(Self {
            shape,
            target,
            layers,
            input_norm: None,
            output_norm: None,
        })
    }

    /// Attach input statistics (post-training).
    pub fn with_normalization(mut self, norm: Normalization) -> Result<Self> {
        self.set_normalization(norm)?;
        Ok(self)
    }

    pub fn set_normalization(&mut self, norm: Normalization) -> Result<()> {
        if norm.dim() != self.shape.flat_width() {
            return Err(QuadError::length(self.shape.flat_width(), norm.dim()));
        }
        self.input_norm = Some(norm);
        Ok(())
    }

    pub fn set_output_normalization(&mut self, norm: Normalization) -> Result<()> {
        if norm.dim() != self.shape.state_dim {
            return Err(QuadError::length(self.shape.state_dim, norm.dim()));
        }
        self.output_norm = Some(norm);
        Ok(())
    }

    pub fn layers(&self) -> &[DenseLayer] {
        &self.layers
    }

    pub fn num_parameters(&self) -> usize {
        self.layers
            .iter()
            .map(|l| l.weight.len() + l.bias.len())
            .sum()
    }
}

impl DynamicsModel for MlpDynamics {
    fn shape(&self) -> HistoryShape {
        self.shape
    }

    fn target(&self) -> PredictionTarget {
        self.target
    }

    fn input_normalization(&self) -> Option<&Normalization> {
        self.input_norm.as_ref()
    }

    fn output_normalization(&self) -> Option<&Normalization> {
        self.output_norm.as_ref()
    }

    fn predict(&self, inputs: ArrayView2<f32>) -> Result<Array2<f32>> {
        if inputs.ncols() != self.shape.flat_width() {
            return Err(QuadError::ShapeMismatch {
                expected: vec![inputs.nrows(), self.shape.flat_width()],
                actual: inputs.shape().to_vec(),
            });
        }
        let last = self.layers.len() - 1;
        let mut x = inputs.to_owned();
        for (i, layer) in self.layers.iter().enumerate() {
            x = layer.forward(x.view());
            if i < last {
                x.mapv_inplace(|v| v.max(0.0));
            }
        }
        Ok(x)
    }
}
