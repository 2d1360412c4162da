//! Skeleton loading with root-height correction.
//!
//! Capture files place the root at an arbitrary height. Graph features assume
//! the root height equals the ground-to-hip distance, so the loader measures
//! that distance along the foot chain and writes it into the root offset.

use std::path::Path;

use log::debug;

use crate::bvh::{self, BvhOptions};
use crate::error::MotionError;
use crate::skeleton::{RootHeightCorrection, SkeletonHierarchy};

/// Foot-chain end joints tried, in priority order, as the ground reference.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FootAnchor {
    LeftToeBaseEnd,
    LeftToeEnd,
    LeftFootEnd,
}

impl FootAnchor {
    pub const PRIORITY: [FootAnchor; 3] = [
        FootAnchor::LeftToeBaseEnd,
        FootAnchor::LeftToeEnd,
        FootAnchor::LeftFootEnd,
    ];

    pub fn joint_name(self) -> &'static str {
        match self {
            FootAnchor::LeftToeBaseEnd => "LeftToeBase_End",
            FootAnchor::LeftToeEnd => "LeftToe_End",
            FootAnchor::LeftFootEnd => "LeftFoot_End",
        }
    }

    /// First anchor present on the skeleton, with its joint index.
    pub fn locate(skeleton: &SkeletonHierarchy) -> Result<(FootAnchor, usize), MotionError> {
        Self::PRIORITY
            .iter()
            .find_map(|&anchor| {
                skeleton
                    .joint_index(anchor.joint_name())
                    .map(|index| (anchor, index))
            })
            .ok_or_else(|| MotionError::SkeletonTopology {
                candidates: Self::PRIORITY.iter().map(|a| a.joint_name()).collect(),
            })
    }
}

/// Ground-to-root height: the negated sum of vertical offsets from `joint` up to the root.
pub fn chain_height(skeleton: &SkeletonHierarchy, joint: usize) -> f32 {
    let mut height = 0.0;
    let mut current = joint;
    while let Some(parent) = skeleton.parent(current) {
        height -= skeleton.joint(current).offset.y;
        current = parent;
    }
    height
}

/// Place the root at the height implied by its foot chain. Returns the new root height.
pub fn correct_root_height(skeleton: &mut SkeletonHierarchy) -> Result<f32, MotionError> {
    let (anchor, index) = FootAnchor::locate(skeleton)?;
    let height = chain_height(skeleton, index);

    let mut offset = skeleton.joint(0).offset;
    let original = skeleton
        .root_correction()
        .map_or(offset.y, |c| c.original);
    offset.y = height;
    skeleton.set_root_offset(offset);
    skeleton.set_root_correction(RootHeightCorrection {
        original,
        corrected: height,
    });
    debug!(
        "root height of '{}' corrected {original} -> {height} via {}",
        skeleton.name(),
        anchor.joint_name()
    );
    Ok(height)
}

/// Load the skeleton embedded in a motion file and correct its root height.
pub fn load_skeleton(
    path: impl AsRef<Path>,
    options: &BvhOptions,
) -> Result<SkeletonHierarchy, MotionError> {
    let motion = bvh::load(path, options)?;
    let mut skeleton = motion.skeleton;
    correct_root_height(&mut skeleton)?;
    Ok(skeleton)
}
