//! Box (continuous) observation/action space

use super::Space;
use crate::{QuadError, Result};
use ndarray::{Array1, Array2, ArrayView1, ArrayViewMut1};
use rand::Rng;
use rand_distr::{Distribution, Uniform};

/// Box space for continuous vectors with per-element bounds
#[derive(Clone, Debug, PartialEq)]
pub struct Box {
    /// Lower bound for each element
    pub low: Array1<f32>,
    /// Upper bound for each element
    pub high: Array1<f32>,
    shape: [usize; 1],
}

impl Box {
    /// Create a new box space with given bounds
    pub fn new(low: Array1<f32>, high: Array1<f32>) -> Result<Self> {
        if low.len() != high.len() {
            return Err(QuadError::length(low.len(), high.len()));
        }
        if low.iter().zip(high.iter()).any(|(l, h)| l > h) {
            return Err(QuadError::Config(
                "box lower bound exceeds upper bound".into(),
            ));
        }
        let shape = [low.len()];
        Ok(Self { low, high, shape })
    }

    /// Create a box space with uniform bounds
    pub fn uniform(dim: usize, low: f32, high: f32) -> Self {
        Self {
            low: Array1::from_elem(dim, low),
            high: Array1::from_elem(dim, high),
            shape: [dim],
        }
    }

    /// Create a box space from -inf to +inf (unbounded)
    pub fn unbounded(dim: usize) -> Self {
        Self::uniform(dim, f32::NEG_INFINITY, f32::INFINITY)
    }

    /// Number of elements in a sample
    pub fn dim(&self) -> usize {
        self.shape[0]
    }

    /// Clip a vector in place to the bounds
    pub fn clip(&self, mut value: ArrayViewMut1<f32>) {
        value
            .iter_mut()
            .zip(self.low.iter().zip(self.high.iter()))
            .for_each(|(v, (&l, &h))| *v = v.clamp(l, h));
    }

    /// Check containment for a borrowed vector
    pub fn contains_view(&self, value: ArrayView1<f32>) -> bool {
        value.len() == self.dim()
            && value
                .iter()
                .zip(self.low.iter().zip(self.high.iter()))
                .all(|(&v, (&l, &h))| v >= l && v <= h)
    }

    /// Sample `rows` independent vectors, one per row.
    ///
    /// The per-element distributions are built once and reused across rows.
    pub fn sample_batch<R: Rng>(&self, rng: &mut R, rows: usize) -> Array2<f32> {
        let dists: Vec<ElementDist> = self
            .low
            .iter()
            .zip(self.high.iter())
            .map(|(&l, &h)| ElementDist::new(l, h))
            .collect();
        let mut out = Array2::zeros((rows, self.dim()));
        for mut row in out.rows_mut() {
            for (v, dist) in row.iter_mut().zip(dists.iter()) {
                *v = dist.sample(rng);
            }
        }
        out
    }
}

/// Uniform distribution for one element; degenerate or unbounded ranges
/// collapse to a fixed value.
enum ElementDist {
    Uniform(Uniform<f32>),
    Fixed(f32),
}

impl ElementDist {
    fn new(low: f32, high: f32) -> Self {
        if low.is_finite() && high.is_finite() && low < high {
            ElementDist::Uniform(Uniform::new(low, high))
        } else if low.is_finite() {
            ElementDist::Fixed(low)
        } else if high.is_finite() {
            ElementDist::Fixed(high)
        } else {
            ElementDist::Fixed(0.0)
        }
    }

    fn sample<R: Rng>(&self, rng: &mut R) -> f32 {
        match self {
            ElementDist::Uniform(d) => d.sample(rng),
            ElementDist::Fixed(v) => *v,
        }
    }
}

impl Space for Box {
    type Sample = Array1<f32>;

    fn sample<R: Rng>(&self, rng: &mut R) -> Self::Sample {
        self.low
            .iter()
            .zip(self.high.iter())
            .map(|(&l, &h)| ElementDist::new(l, h).sample(rng))
            .collect()
    }

    fn contains(&self, value: &Self::Sample) -> bool {
        self.contains_view(value.view())
    }

    fn shape(&self) -> &[usize] {
        &self.shape
    }
}
