//! Stacked state/action histories.
//!
//! The dynamics model is conditioned on the last `n` states and actions,
//! flattened as `[s_0 .. s_{n-1}, a_0 .. a_{n-1}]` (oldest first). This module
//! provides:
//! - `StackedHistory` - one live trajectory slot, backed by ring buffers
//! - `BatchedStackedHistory` - many rows at once for planning, with a bulk `slide`

mod batched;
mod stacked;

pub use batched::BatchedStackedHistory;
pub use stacked::StackedHistory;

use crate::{QuadError, Result};
use serde::{Deserialize, Serialize};

/// Dimensions shared by every history, model and planner in a run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryShape {
    /// Width of one state vector
    pub state_dim: usize,
    /// Width of one action vector
    pub action_dim: usize,
    /// Number of stacked entries
    pub stack_n: usize,
}

impl HistoryShape {
    /// Create a validated shape. All dimensions must be non-zero.
    pub fn new(state_dim: usize, action_dim: usize, stack_n: usize) -> Result<Self> {
        if state_dim == 0 || action_dim == 0 || stack_n == 0 {
            return Err(QuadError::ShapeMismatch {
                expected: vec![1, 1, 1],
                actual: vec![state_dim, action_dim, stack_n],
            });
        }
        Ok(Self {
            state_dim,
            action_dim,
            stack_n,
        })
    }

    /// Width of the flattened state block
    pub fn state_width(&self) -> usize {
        self.state_dim * self.stack_n
    }

    /// Width of the flattened action block
    pub fn action_width(&self) -> usize {
        self.action_dim * self.stack_n
    }

    /// Width of the full model input row
    pub fn flat_width(&self) -> usize {
        self.state_width() + self.action_width()
    }

    pub(crate) fn as_vec(&self) -> Vec<usize> {
        vec![self.state_dim, self.action_dim, self.stack_n]
    }
}
