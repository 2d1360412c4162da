//! Error types for skeleton loading, BVH I/O and motion processing.

use std::path::PathBuf;

#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum MotionError {
    /// Referenced motion file does not exist.
    #[error("file not found: {}", path.display())]
    FileNotFound { path: PathBuf },

    /// Underlying I/O failure while reading or writing a motion file.
    #[error("io error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Malformed BVH text.
    #[error("bvh parse error at line {line}: {reason}")]
    Parse { line: usize, reason: String },

    /// None of the foot-anchor candidates exist on the skeleton.
    #[error("no foot anchor joint found (tried {candidates:?})")]
    SkeletonTopology { candidates: Vec<&'static str> },

    /// Hierarchy violates the single-root / parent-before-child contract.
    #[error("invalid skeleton hierarchy: {reason}")]
    InvalidHierarchy { reason: String },

    /// Per-joint array length does not match the skeleton joint count.
    #[error("joint count mismatch: expected {expected}, got {actual}")]
    JointCountMismatch { expected: usize, actual: usize },

    /// A motion with zero frames was passed where at least one is required.
    #[error("motion has no frames")]
    EmptyMotion,
}

impl MotionError {
    /// Short category label used in logs and client-visible error sentinels.
    pub fn category(&self) -> &'static str {
        match self {
            Self::FileNotFound { .. } => "file_not_found",
            Self::Io { .. } => "io",
            Self::Parse { .. } => "parse",
            Self::SkeletonTopology { .. } => "skeleton_topology",
            Self::InvalidHierarchy { .. } | Self::JointCountMismatch { .. } => "hierarchy",
            Self::EmptyMotion => "empty_motion",
        }
    }

    pub(crate) fn parse(line: usize, reason: impl Into<String>) -> Self {
        Self::Parse {
            line,
            reason: reason.into(),
        }
    }
}
