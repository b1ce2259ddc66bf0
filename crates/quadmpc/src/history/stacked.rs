//! Single-slot stacked history backed by fixed-capacity ring buffers.

use super::HistoryShape;
use crate::{QuadError, Result};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2};

/// Fixed-capacity ring of equally sized vectors stored in one allocation.
#[derive(Clone, Debug)]
struct Ring {
    data: Vec<f32>,
    width: usize,
    capacity: usize,
    /// Slot holding the oldest entry
    head: usize,
}

impl Ring {
    fn filled(width: usize, capacity: usize, init: Option<ArrayView1<f32>>) -> Self {
        let mut ring = Self {
            data: vec![0.0; width * capacity],
            width,
            capacity,
            head: 0,
        };
        if let Some(init) = init {
            for slot in ring.data.chunks_exact_mut(width) {
                slot.iter_mut().zip(init.iter()).for_each(|(d, &s)| *d = s);
            }
        }
        ring
    }

    fn push(&mut self, entry: ArrayView1<f32>) {
        let start = self.head * self.width;
        self.data[start..start + self.width]
            .iter_mut()
            .zip(entry.iter())
            .for_each(|(d, &s)| *d = s);
        self.head = (self.head + 1) % self.capacity;
    }

    fn last(&self) -> &[f32] {
        let slot = (self.head + self.capacity - 1) % self.capacity;
        &self.data[slot * self.width..(slot + 1) * self.width]
    }

    /// Copy entries oldest-first into `out` (length `width * capacity`).
    fn write_ordered(&self, out: &mut [f32]) {
        let split = self.head * self.width;
        let tail = self.data.len() - split;
        out[..tail].copy_from_slice(&self.data[split..]);
        out[tail..].copy_from_slice(&self.data[..split]);
    }

    fn ordered(&self) -> Vec<f32> {
        let mut out = vec![0.0; self.data.len()];
        self.write_ordered(&mut out);
        out
    }

    fn to_matrix(&self) -> Array2<f32> {
        let flat = self.ordered();
        let width = self.width;
        Array2::from_shape_fn((self.capacity, width), |(i, j)| flat[i * width + j])
    }

    fn replace(&mut self, entries: ArrayView2<f32>) {
        for (slot, row) in self.data.chunks_exact_mut(self.width).zip(entries.rows()) {
            slot.iter_mut().zip(row.iter()).for_each(|(d, &s)| *d = s);
        }
        self.head = 0;
    }
}

/// The last `n` states and actions of one trajectory, oldest first.
///
/// Both buffers always hold exactly `n` entries; appending evicts the oldest.
#[derive(Clone, Debug)]
pub struct StackedHistory {
    shape: HistoryShape,
    states: Ring,
    actions: Ring,
}

fn check_entry(expected: usize, entry: Option<ArrayView1<f32>>) -> Result<()> {
    match entry {
        Some(v) if v.len() != expected => Err(QuadError::length(expected, v.len())),
        _ => Ok(()),
    }
}

impl StackedHistory {
    /// Create a history filled with `init_state` / `init_action`, or zeros.
    pub fn new(
        shape: HistoryShape,
        init_state: Option<ArrayView1<f32>>,
        init_action: Option<ArrayView1<f32>>,
    ) -> Result<Self> {
        check_entry(shape.state_dim, init_state)?;
        check_entry(shape.action_dim, init_action)?;
        Ok(Self {
            shape,
            states: Ring::filled(shape.state_dim, shape.stack_n, init_state),
            actions: Ring::filled(shape.action_dim, shape.stack_n, init_action),
        })
    }

    pub fn shape(&self) -> HistoryShape {
        self.shape
    }

    /// Push a state and/or action; omitted arguments leave that buffer untouched.
    ///
    /// Both entries are validated before either buffer changes.
    pub fn append(
        &mut self,
        state: Option<ArrayView1<f32>>,
        action: Option<ArrayView1<f32>>,
    ) -> Result<()> {
        check_entry(self.shape.state_dim, state)?;
        check_entry(self.shape.action_dim, action)?;
        if let Some(s) = state {
            self.states.push(s);
        }
        if let Some(a) = action {
            self.actions.push(a);
        }
        Ok(())
    }

    pub fn push_state(&mut self, state: ArrayView1<f32>) -> Result<()> {
        self.append(Some(state), None)
    }

    pub fn push_action(&mut self, action: ArrayView1<f32>) -> Result<()> {
        self.append(None, Some(action))
    }

    /// Owned `n × state_dim` and `n × action_dim` matrices, oldest row first.
    pub fn snapshot(&self) -> (Array2<f32>, Array2<f32>) {
        (self.states.to_matrix(), self.actions.to_matrix())
    }

    /// Most recently appended state
    pub fn last_state(&self) -> ArrayView1<'_, f32> {
        ArrayView1::from(self.states.last())
    }

    /// Most recently appended action
    pub fn last_action(&self) -> ArrayView1<'_, f32> {
        ArrayView1::from(self.actions.last())
    }

    /// Flattened state block, oldest first
    pub fn flattened_states(&self) -> Array1<f32> {
        Array1::from(self.states.ordered())
    }

    /// Flattened action block, oldest first
    pub fn flattened_actions(&self) -> Array1<f32> {
        Array1::from(self.actions.ordered())
    }

    /// `[states..., actions...]`, the layout the dynamics model consumes
    pub fn flattened(&self) -> Array1<f32> {
        let mut out = vec![0.0; self.shape.flat_width()];
        self.write_flattened(&mut out);
        Array1::from(out)
    }

    pub(crate) fn write_flattened(&self, out: &mut [f32]) {
        let (states, actions) = out.split_at_mut(self.shape.state_width());
        self.states.write_ordered(states);
        self.actions.write_ordered(actions);
    }

    /// Replace both buffers with recorded `n × dim` matrices.
    pub fn fill_from(&mut self, states: ArrayView2<f32>, actions: ArrayView2<f32>) -> Result<()> {
        let expected_states = (self.shape.stack_n, self.shape.state_dim);
        let expected_actions = (self.shape.stack_n, self.shape.action_dim);
        if states.dim() != expected_states {
            return Err(QuadError::ShapeMismatch {
                expected: vec![expected_states.0, expected_states.1],
                actual: states.shape().to_vec(),
            });
        }
        if actions.dim() != expected_actions {
            return Err(QuadError::ShapeMismatch {
                expected: vec![expected_actions.0, expected_actions.1],
                actual: actions.shape().to_vec(),
            });
        }
        self.states.replace(states);
        self.actions.replace(actions);
        Ok(())
    }

    /// Reinitialize both buffers, keeping the shape.
    pub fn reset(
        &mut self,
        init_state: Option<ArrayView1<f32>>,
        init_action: Option<ArrayView1<f32>>,
    ) -> Result<()> {
        *self = Self::new(self.shape, init_state, init_action)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn shape(state_dim: usize, action_dim: usize, n: usize) -> HistoryShape {
        HistoryShape::new(state_dim, action_dim, n).unwrap()
    }

    #[test]
    fn test_initial_fill() {
        let init = array![0.5, -0.5];
        let h = StackedHistory::new(shape(2, 1, 3), Some(init.view()), None).unwrap();
        let (states, actions) = h.snapshot();
        assert_eq!(states, array![[0.5f32, -0.5], [0.5, -0.5], [0.5, -0.5]]);
        assert_eq!(actions, Array2::<f32>::zeros((3, 1)));
    }

    #[test]
    fn test_append_evicts_oldest() {
        let zero = array![0.0, 0.0];
        let mut h = StackedHistory::new(shape(2, 1, 4), Some(zero.view()), None).unwrap();
        for i in 1..=5 {
            let v = i as f32;
            h.push_state(array![v, v].view()).unwrap();
        }
        let (states, _) = h.snapshot();
        assert_eq!(
            states,
            array![[2.0f32, 2.0], [3.0, 3.0], [4.0, 4.0], [5.0, 5.0]]
        );
        assert_eq!(h.last_state(), array![5.0f32, 5.0]);
    }

    #[test]
    fn test_n_plus_one_appends_keep_n() {
        for n in 1..6 {
            let mut h = StackedHistory::new(shape(1, 1, n), None, None).unwrap();
            for i in 0..=n {
                h.push_action(array![i as f32].view()).unwrap();
            }
            let (_, actions) = h.snapshot();
            assert_eq!(actions.nrows(), n);
            let expected: Vec<f32> = (1..=n).map(|i| i as f32).collect();
            assert_eq!(actions.column(0).to_vec(), expected);
        }
    }

    #[test]
    fn test_append_omitted_argument_is_noop() {
        let mut h = StackedHistory::new(shape(1, 1, 2), None, None).unwrap();
        h.append(Some(array![3.0].view()), None).unwrap();
        assert_eq!(h.last_action(), array![0.0f32]);
        assert_eq!(h.last_state(), array![3.0f32]);
    }

    #[test]
    fn test_shape_mismatch() {
        let bad = array![1.0, 2.0, 3.0];
        assert!(matches!(
            StackedHistory::new(shape(2, 1, 2), Some(bad.view()), None),
            Err(QuadError::ShapeMismatch { .. })
        ));

        let mut h = StackedHistory::new(shape(2, 1, 2), None, None).unwrap();
        let before = h.flattened();
        // A bad action must not let the valid state through either.
        let result = h.append(Some(array![1.0, 1.0].view()), Some(bad.view()));
        assert!(result.is_err());
        assert_eq!(h.flattened(), before);
    }

    #[test]
    fn test_flattened_layout() {
        let mut h = StackedHistory::new(shape(2, 1, 2), None, None).unwrap();
        h.append(Some(array![1.0, 2.0].view()), Some(array![9.0].view()))
            .unwrap();
        assert_eq!(h.flattened(), array![0.0f32, 0.0, 1.0, 2.0, 0.0, 9.0]);
    }

    #[test]
    fn test_fill_from_and_reset() {
        let mut h = StackedHistory::new(shape(1, 1, 3), None, None).unwrap();
        h.push_state(array![7.0].view()).unwrap();
        h.fill_from(
            array![[1.0], [2.0], [3.0]].view(),
            array![[4.0], [5.0], [6.0]].view(),
        )
        .unwrap();
        assert_eq!(h.flattened(), array![1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0]);
        assert_eq!(h.last_state(), array![3.0f32]);

        let short = h.fill_from(
            array![[1.0], [2.0]].view(),
            array![[4.0], [5.0], [6.0]].view(),
        );
        assert!(short.is_err());

        h.reset(Some(array![8.0].view()), None).unwrap();
        assert_eq!(h.flattened(), array![8.0f32, 8.0, 8.0, 0.0, 0.0, 0.0]);
    }
}
