//! Input/output normalization statistics.

use crate::{QuadError, Result};
use ndarray::{Array1, Array2, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

/// Per-feature statistics applied as `(x - mean) / (std + epsilon)`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Normalization {
    pub mean: Array1<f32>,
    pub std: Array1<f32>,
    pub epsilon: f32,
}

impl Normalization {
    pub fn new(mean: Array1<f32>, std: Array1<f32>, epsilon: f32) -> Result<Self> {
        if mean.len() != std.len() {
            return Err(QuadError::length(mean.len(), std.len()));
        }
        Ok(Self { mean, std, epsilon })
    }

    /// Statistics that leave data unchanged.
    pub fn identity(dim: usize) -> Self {
        Self {
            mean: Array1::zeros(dim),
            std: Array1::ones(dim),
            epsilon: 0.0,
        }
    }

    /// Column statistics of a `(samples, features)` matrix.
    pub fn from_data(data: ArrayView2<f32>, epsilon: f32) -> Result<Self> {
        let mean = data
            .mean_axis(Axis(0))
            .ok_or_else(|| QuadError::Data("cannot normalize an empty batch".into()))?;
        let std = data.std_axis(Axis(0), 0.0);
        Self::new(mean, std, epsilon)
    }

    pub fn dim(&self) -> usize {
        self.mean.len()
    }

    pub fn normalize(&self, raw: ArrayView2<f32>) -> Result<Array2<f32>> {
        self.check(raw)?;
        let centered = &raw - &self.mean;
        Ok(&centered / &(&self.std + self.epsilon))
    }

    /// Inverse of `normalize`.
    pub fn denormalize(&self, normalized: ArrayView2<f32>) -> Result<Array2<f32>> {
        self.check(normalized)?;
        let scaled = &normalized * &(&self.std + self.epsilon);
        Ok(&scaled + &self.mean)
    }

    fn check(&self, data: ArrayView2<f32>) -> Result<()> {
        if data.ncols() != self.dim() {
            return Err(QuadError::ShapeMismatch {
                expected: vec![data.nrows(), self.dim()],
                actual: data.shape().to_vec(),
            });
        }
        Ok(())
    }
}
