//! Checkpoint persistence for dynamics models.
//!
//! Provides:
//! - `Checkpointable` trait for components that can be saved/restored
//! - `DynamicsCheckpoint`, the serialized weights plus normalization statistics
//! - `save_to_path` / `load_from_path` helpers

mod state;

pub use state::{Checkpointable, DynamicsCheckpoint};

use crate::Result;
use std::fs;
use std::path::Path;

/// Write a checkpointable component to a file.
pub fn save_to_path<T: Checkpointable>(component: &T, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    fs::write(path, component.save_state()?)?;
    tracing::info!(path = %path.display(), "Saved checkpoint");
    Ok(())
}

/// Restore a checkpointable component from a file.
pub fn load_from_path<T: Checkpointable>(component: &mut T, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let data = fs::read(path)?;
    component.load_state(&data)?;
    tracing::info!(path = %path.display(), "Loaded checkpoint");
    Ok(())
}

/// Read a `DynamicsCheckpoint` record without building a model.
pub fn read_checkpoint(path: impl AsRef<Path>) -> Result<DynamicsCheckpoint> {
    let data = fs::read(path.as_ref())?;
    Ok(serde_json::from_slice(&data)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dynamics::{DynamicsModel, MlpDynamics, Normalization, PredictionTarget};
    use crate::history::HistoryShape;
    use rand::SeedableRng;
    use tempfile::tempdir;

    #[test]
    fn test_save_and_load_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("models").join("dynamics.json");

        let shape = HistoryShape::new(2, 1, 3).unwrap();
        let mut rng = rand::rngs::StdRng::seed_from_u64(5);
        let model = MlpDynamics::new(shape, &[6, 6], PredictionTarget::NextState, &mut rng)
            .with_normalization(Normalization::identity(shape.flat_width()))
            .unwrap();

        save_to_path(&model, &path).unwrap();
        assert!(path.exists());

        let record = read_checkpoint(&path).unwrap();
        assert_eq!(record.stack_n, 3);
        assert_eq!(record.target, PredictionTarget::NextState);

        let mut restored = MlpDynamics::new(shape, &[2], PredictionTarget::Delta, &mut rng);
        load_from_path(&mut restored, &path).unwrap();
        assert_eq!(restored.layers().len(), model.layers().len());
        for (r, m) in restored.layers().iter().zip(model.layers()) {
            assert_eq!(r.weight.dim(), m.weight.dim());
            let max_diff = (&r.weight - &m.weight)
                .iter()
                .fold(0.0f32, |acc, v| acc.max(v.abs()));
            assert!(max_diff < 1e-6);
        }
        assert_eq!(restored.target(), PredictionTarget::NextState);
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempdir().unwrap();
        let shape = HistoryShape::new(1, 1, 1).unwrap();
        let mut rng = rand::rngs::StdRng::seed_from_u64(5);
        let mut model = MlpDynamics::new(shape, &[], PredictionTarget::Delta, &mut rng);
        assert!(load_from_path(&mut model, dir.path().join("nope.json")).is_err());
    }
}
