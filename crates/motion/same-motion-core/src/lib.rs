//! SAME motion core.
//!
//! Skeleton hierarchies, the BVH codec, root-height corrected skeleton
//! loading, motion normalization into canonical pose states, and assembly of
//! decoded frames back into a playable motion. Graph encoding lives in
//! `same-graph-core`.

pub mod assemble;
pub mod bvh;
pub mod config;
pub mod contact;
pub mod error;
pub mod loader;
pub mod normalize;
pub mod pose;
pub mod skeleton;

pub use assemble::{assemble_motion, DecodedFrame};
pub use bvh::BvhOptions;
pub use config::NormalizeOptions;
pub use contact::{ContactOptions, ContactRule, HeightVelocityContact};
pub use error::MotionError;
pub use loader::{chain_height, correct_root_height, load_skeleton, FootAnchor};
pub use normalize::{normalize_motion, CanonicalMotion};
pub use pose::{Motion, Pose, PoseState};
pub use skeleton::{Joint, RootHeightCorrection, SkeletonHierarchy};

pub use nalgebra;
