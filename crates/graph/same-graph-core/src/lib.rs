//! SAME graph core.
//!
//! Encodes skeleton hierarchies and canonical pose states as graphs, packs
//! them into flat [`GraphBatch`]es for the external model, and decodes model
//! output back into per-frame joint transforms and contact labels.

pub mod batch;
pub mod decode;
pub mod error;
pub mod features;
pub mod graph;
pub mod inference;
pub mod layout;
pub mod stats;

pub use batch::{assemble_pose_batch, assemble_skeleton_batch, GraphBatch, NodeMatrix, PoseFeatures};
pub use decode::{decode_output, gt_recon, rest_pose_recon};
pub use error::GraphError;
pub use graph::{
    motion_to_pose_graphs, skeleton_to_graph, PoseGraph, PoseGraphs, PoseNode, RootState,
    SkeletonGraph, SkeletonNode,
};
pub use inference::{InferenceAdapter, InferenceError, RawOutput};
pub use layout::{FeatureLayout, PoseField, Representation};
pub use stats::{FieldStats, NormalizationStatistics};
