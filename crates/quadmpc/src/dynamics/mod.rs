//! Learned dynamics: the model interface, normalization statistics and an
//! inference-only MLP.

mod mlp;
mod model;
mod normalization;

pub use mlp::{DenseLayer, MlpDynamics};
pub use model::{predict_next_states, DynamicsModel, PredictionTarget};
pub use normalization::Normalization;
