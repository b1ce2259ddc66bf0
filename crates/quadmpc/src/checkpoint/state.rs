//! Dynamics checkpoint record and the `Checkpointable` trait.

use crate::dynamics::{DenseLayer, MlpDynamics, Normalization, PredictionTarget};
use crate::history::HistoryShape;
use crate::{QuadError, Result};
use ndarray::Array1;
use serde::{Deserialize, Serialize};

/// Trait for components that can be saved/restored as bytes.
///
/// # Example
///
/// ```ignore
/// let bytes = model.save_state()?;
/// let mut restored = MlpDynamics::new(shape, &[250, 250], PredictionTarget::Delta, &mut rng);
/// restored.load_state(&bytes)?;
/// ```
pub trait Checkpointable {
    /// Serialize the component's state to bytes.
    fn save_state(&self) -> Result<Vec<u8>>;

    /// Restore the component's state from bytes.
    fn load_state(&mut self, data: &[u8]) -> Result<()>;
}

/// Persisted dynamics model: weights plus the statistics set after training.
///
/// Normalization fields are optional so that a checkpoint written before the
/// statistics exist still loads; using such a model for planning fails with
/// `NormalizationUnavailable`.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct DynamicsCheckpoint {
    pub state_dim: usize,
    pub action_dim: usize,
    pub stack_n: usize,
    #[serde(default)]
    pub target: PredictionTarget,
    pub layers: Vec<DenseLayer>,
    #[serde(default)]
    pub mean_input: Option<Array1<f32>>,
    #[serde(default)]
    pub std_input: Option<Array1<f32>>,
    #[serde(default)]
    pub epsilon: Option<f32>,
    #[serde(default)]
    pub output_normalization: Option<Normalization>,
    /// Seconds since the Unix epoch
    pub timestamp: String,
    /// quadmpc version that wrote the checkpoint
    pub version: String,
}

impl DynamicsCheckpoint {
    /// Snapshot a model.
    pub fn from_model(model: &MlpDynamics) -> Self {
        use crate::dynamics::DynamicsModel;

        let shape = model.shape();
        let input = model.input_normalization();
        Self {
            state_dim: shape.state_dim,
            action_dim: shape.action_dim,
            stack_n: shape.stack_n,
            target: model.target(),
            layers: model.layers().to_vec(),
            mean_input: input.map(|n| n.mean.clone()),
            std_input: input.map(|n| n.std.clone()),
            epsilon: input.map(|n| n.epsilon),
            output_normalization: model.output_normalization().cloned(),
            timestamp: unix_timestamp(),
            version: crate::VERSION.to_string(),
        }
    }

    pub fn shape(&self) -> Result<HistoryShape> {
        HistoryShape::new(self.state_dim, self.action_dim, self.stack_n)
    }

    /// Input statistics, if all three fields were recorded.
    pub fn input_normalization(&self) -> Result<Normalization> {
        match (&self.mean_input, &self.std_input, self.epsilon) {
            (Some(mean), Some(std), Some(eps)) => Normalization::new(mean.clone(), std.clone(), eps),
            _ => Err(QuadError::NormalizationUnavailable),
        }
    }

    /// Rebuild the model this checkpoint describes.
    pub fn to_model(&self) -> Result<MlpDynamics> {
        let mut model = MlpDynamics::from_layers(self.shape()?, self.target, self.layers.clone())?;
        match self.input_normalization() {
            Ok(norm) => model.set_normalization(norm)?,
            Err(QuadError::NormalizationUnavailable) => {
                tracing::warn!("checkpoint has no input normalization statistics");
            }
            Err(e) => return Err(e),
        }
        if let Some(norm) = &self.output_normalization {
            model.set_output_normalization(norm.clone())?;
        }
        Ok(model)
    }
}

impl Checkpointable for MlpDynamics {
    fn save_state(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(&DynamicsCheckpoint::from_model(self))?)
    }

    fn load_state(&mut self, data: &[u8]) -> Result<()> {
        let checkpoint: DynamicsCheckpoint = serde_json::from_slice(data)?;
        *self = checkpoint.to_model()?;
        Ok(())
    }
}

fn unix_timestamp() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let duration = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    duration.as_secs().to_string()
}
