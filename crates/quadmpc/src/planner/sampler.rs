//! Candidate action sequence sampling.

use crate::spaces::Box as BoxSpace;
use crate::{QuadError, Result};
use ndarray::{Array2, Array3, Axis};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// How candidate action sequences are drawn.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SamplerKind {
    /// Independent uniform samples for every timestep and candidate
    #[default]
    Uniform,
    /// Low-pass filtered noise: `u_t = beta * n_t + (1 - beta) * u_{t-1}`,
    /// with `n_t` uniform in bounds and `u_0 = n_0`
    Filtered { beta: f32 },
}

/// Draws `(horizon, candidates, action_dim)` action tensors inside a box.
#[derive(Clone, Debug)]
pub struct ActionSampler {
    space: BoxSpace,
    kind: SamplerKind,
}

impl ActionSampler {
    pub fn new(space: BoxSpace, kind: SamplerKind) -> Result<Self> {
        if space
            .low
            .iter()
            .chain(space.high.iter())
            .any(|v| !v.is_finite())
        {
            return Err(QuadError::Config(
                "action space must have finite bounds for sampling".into(),
            ));
        }
        if let SamplerKind::Filtered { beta } = kind {
            if !(beta > 0.0 && beta <= 1.0) {
                return Err(QuadError::Config(format!(
                    "filter coefficient must be in (0, 1], got {beta}"
                )));
            }
        }
        Ok(Self { space, kind })
    }

    pub fn kind(&self) -> SamplerKind {
        self.kind
    }

    pub fn space(&self) -> &BoxSpace {
        &self.space
    }

    /// Sample one action per `(timestep, candidate)` pair.
    pub fn sample<R: Rng>(&self, rng: &mut R, horizon: usize, candidates: usize) -> Array3<f32> {
        let mut out = Array3::zeros((horizon, candidates, self.space.dim()));
        let mut prev: Option<Array2<f32>> = None;
        for mut step in out.axis_iter_mut(Axis(0)) {
            let noise = self.space.sample_batch(rng, candidates);
            let mut current = match (self.kind, prev.take()) {
                (SamplerKind::Filtered { beta }, Some(p)) => noise * beta + &(p * (1.0 - beta)),
                _ => noise,
            };
            for row in current.rows_mut() {
                self.space.clip(row);
            }
            step.assign(&current);
            prev = Some(current);
        }
        out
    }
}
