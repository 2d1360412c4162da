use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum GraphError {
    /// Pointer table, row counts or per-node arrays disagree with the batch.
    #[error("graph batch mismatch: {reason}")]
    GraphBatchMismatch { reason: String },

    #[error("cannot assemble an empty graph batch")]
    EmptyBatch,

    #[error("invalid feature layout: {reason}")]
    Layout { reason: String },

    #[error("invalid normalization statistics: {reason}")]
    Stats { reason: String },

    #[error("io error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl GraphError {
    pub fn category(&self) -> &'static str {
        match self {
            Self::GraphBatchMismatch { .. } => "graph_batch_mismatch",
            Self::EmptyBatch => "empty_batch",
            Self::Layout { .. } => "layout",
            Self::Stats { .. } => "statistics",
            Self::Io { .. } => "io",
        }
    }

    pub(crate) fn mismatch(reason: impl Into<String>) -> Self {
        Self::GraphBatchMismatch {
            reason: reason.into(),
        }
    }
}
