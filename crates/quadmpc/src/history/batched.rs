//! Batched stacked history used by the planner.

use super::{HistoryShape, StackedHistory};
use crate::{QuadError, Result};
use ndarray::{s, Array1, Array2, ArrayView2, Axis};

/// Stacked histories for `num_parallel` rows stored as two flat matrices.
///
/// Column layout is always oldest block first. The state matrix is
/// `(num_parallel, n * state_dim)` and the action matrix
/// `(num_parallel, n * action_dim)`.
#[derive(Clone, Debug)]
pub struct BatchedStackedHistory {
    shape: HistoryShape,
    states: Array2<f32>,
    actions: Array2<f32>,
}

impl BatchedStackedHistory {
    /// Zero-filled batch with `num_parallel` rows.
    pub fn new(shape: HistoryShape, num_parallel: usize) -> Result<Self> {
        if num_parallel == 0 {
            return Err(QuadError::length(1, 0));
        }
        Ok(Self {
            shape,
            states: Array2::zeros((num_parallel, shape.state_width())),
            actions: Array2::zeros((num_parallel, shape.action_width())),
        })
    }

    /// Batch with every row seeded from `history`.
    pub fn broadcast(history: &StackedHistory, num_parallel: usize) -> Result<Self> {
        let mut batch = Self::new(history.shape(), num_parallel)?;
        batch.restart(history)?;
        Ok(batch)
    }

    pub fn shape(&self) -> HistoryShape {
        self.shape
    }

    pub fn num_parallel(&self) -> usize {
        self.states.nrows()
    }

    /// Flattened state block for every row
    pub fn states(&self) -> ArrayView2<'_, f32> {
        self.states.view()
    }

    /// Flattened action block for every row
    pub fn actions(&self) -> ArrayView2<'_, f32> {
        self.actions.view()
    }

    /// Newest state of every row, `(num_parallel, state_dim)`.
    pub fn last_states(&self) -> ArrayView2<'_, f32> {
        let start = self.shape.state_width() - self.shape.state_dim;
        self.states.slice(s![.., start..])
    }

    /// Shift every row left by one block and write the entries into the last block.
    ///
    /// Entries are `(num_parallel, action_dim)` and `(num_parallel, state_dim)`.
    /// Both are validated before anything moves.
    pub fn slide(
        &mut self,
        entry_action: Option<ArrayView2<f32>>,
        entry_state: Option<ArrayView2<f32>>,
    ) -> Result<()> {
        let rows = self.num_parallel();
        if let Some(a) = entry_action {
            check_entry(a, rows, self.shape.action_dim)?;
        }
        if let Some(st) = entry_state {
            check_entry(st, rows, self.shape.state_dim)?;
        }
        if let Some(a) = entry_action {
            slide_block(&mut self.actions, self.shape.action_dim, a);
        }
        if let Some(st) = entry_state {
            slide_block(&mut self.states, self.shape.state_dim, st);
        }
        Ok(())
    }

    /// `[states | actions]` per row, the model input layout.
    pub fn flattened(&self) -> Array2<f32> {
        let mut out = Array2::zeros((self.num_parallel(), self.shape.flat_width()));
        self.write_flattened(&mut out);
        out
    }

    /// Write the flattened layout into a preallocated buffer.
    pub fn write_flattened(&self, out: &mut Array2<f32>) {
        let split = self.shape.state_width();
        out.slice_mut(s![.., ..split]).assign(&self.states);
        out.slice_mut(s![.., split..]).assign(&self.actions);
    }

    /// Reseed every row from a single history.
    pub fn restart(&mut self, history: &StackedHistory) -> Result<()> {
        if history.shape() != self.shape {
            return Err(QuadError::ShapeMismatch {
                expected: self.shape.as_vec(),
                actual: history.shape().as_vec(),
            });
        }
        self.states.assign(&history.flattened_states());
        self.actions.assign(&history.flattened_actions());
        Ok(())
    }

    /// Reseed every row from `n × state_dim` and `n × action_dim` matrices.
    pub fn restart_from(&mut self, states: ArrayView2<f32>, actions: ArrayView2<f32>) -> Result<()> {
        let mut single = StackedHistory::new(self.shape, None, None)?;
        single.fill_from(states, actions)?;
        self.restart(&single)
    }

    /// Flattened history of a single row.
    pub fn row(&self, index: usize) -> Option<Array1<f32>> {
        if index >= self.num_parallel() {
            return None;
        }
        let states = self.states.index_axis(Axis(0), index);
        let actions = self.actions.index_axis(Axis(0), index);
        Some(states.iter().chain(actions.iter()).copied().collect())
    }
}

fn check_entry(entry: ArrayView2<f32>, rows: usize, width: usize) -> Result<()> {
    if entry.dim() != (rows, width) {
        return Err(QuadError::ShapeMismatch {
            expected: vec![rows, width],
            actual: entry.shape().to_vec(),
        });
    }
    Ok(())
}

/// Shift all blocks of every row left by `width` columns and write `entry`
/// into the freed tail.
fn slide_block(block: &mut Array2<f32>, width: usize, entry: ArrayView2<f32>) {
    let cols = block.ncols();
    let keep = cols - width;
    if let Some(data) = block.as_slice_mut() {
        for (row, new) in data.chunks_exact_mut(cols).zip(entry.rows()) {
            row.copy_within(width.., 0);
            row[keep..]
                .iter_mut()
                .zip(new.iter())
                .for_each(|(d, &v)| *d = v);
        }
        return;
    }

    // Non-standard layout: same operation column by column.
    for j in 0..keep {
        let (mut dst, src) = block.multi_slice_mut((s![.., j], s![.., j + width]));
        dst.assign(&src);
    }
    block.slice_mut(s![.., keep..]).assign(&entry);
}
