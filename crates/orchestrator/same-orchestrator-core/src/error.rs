use std::path::PathBuf;

use same_graph_core::{GraphError, InferenceError};
use same_motion_core::MotionError;
use thiserror::Error;

/// Every way a single retarget request can fail. None of them end the service.
#[derive(Debug, Error)]
pub enum RetargetError {
    /// Request text is not `<target>;<source>`.
    #[error("malformed request: {reason}")]
    MalformedRequest { reason: String },

    #[error("file not found: {}", path.display())]
    FileNotFound { path: PathBuf },

    /// Root-height correction found no foot anchor on a skeleton.
    #[error("no foot anchor joint found (tried {candidates:?})")]
    SkeletonTopology { candidates: Vec<&'static str> },

    #[error("inference failed: {0}")]
    Inference(#[from] InferenceError),

    /// Batch bookkeeping and feature rows disagree. Internal error.
    #[error("graph batch mismatch: {reason}")]
    GraphBatchMismatch { reason: String },

    #[error(transparent)]
    Motion(MotionError),

    #[error(transparent)]
    Graph(GraphError),
}

impl RetargetError {
    pub fn category(&self) -> &'static str {
        match self {
            Self::MalformedRequest { .. } => "malformed_request",
            Self::FileNotFound { .. } => "file_not_found",
            Self::SkeletonTopology { .. } => "skeleton_topology",
            Self::Inference(_) => "inference",
            Self::GraphBatchMismatch { .. } => "graph_batch_mismatch",
            Self::Motion(e) => e.category(),
            Self::Graph(e) => e.category(),
        }
    }
}

impl From<MotionError> for RetargetError {
    fn from(err: MotionError) -> Self {
        match err {
            MotionError::FileNotFound { path } => Self::FileNotFound { path },
            MotionError::SkeletonTopology { candidates } => Self::SkeletonTopology { candidates },
            other => Self::Motion(other),
        }
    }
}

impl From<GraphError> for RetargetError {
    fn from(err: GraphError) -> Self {
        match err {
            GraphError::GraphBatchMismatch { reason } => Self::GraphBatchMismatch { reason },
            other => Self::Graph(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn component_errors_map_onto_request_taxonomy() {
        let err: RetargetError = MotionError::FileNotFound {
            path: "a.bvh".into(),
        }
        .into();
        assert_eq!(err.category(), "file_not_found");

        let err: RetargetError = MotionError::EmptyMotion.into();
        assert_eq!(err.category(), "empty_motion");

        let err: RetargetError = GraphError::EmptyBatch.into();
        assert_eq!(err.category(), "empty_batch");
    }
}
