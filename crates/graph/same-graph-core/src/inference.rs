//! Boundary to the external retargeting model.

use thiserror::Error;

use crate::batch::{GraphBatch, NodeMatrix};

/// Raw model output: one row per target batch node, indexed by the target's pointer table.
pub type RawOutput = NodeMatrix;

#[derive(Debug, Error)]
pub enum InferenceError {
    /// The backend raised while running the model.
    #[error("model '{checkpoint}' failed: {reason}")]
    Backend { checkpoint: String, reason: String },

    /// The model cannot consume the batch it was given.
    #[error("model input rejected: {reason}")]
    Input { reason: String },
}

/// `(source batch, target batch) -> raw output`.
///
/// Implementations must not mutate shared state; one instance serves every
/// request of the process.
pub trait InferenceAdapter: Send + Sync {
    /// Identifier of the loaded weights.
    fn checkpoint(&self) -> &str;

    fn infer(&self, source: &GraphBatch, target: &GraphBatch) -> Result<RawOutput, InferenceError>;
}
