//! Raw per-frame poses, motions, and the canonical per-frame pose state.

use nalgebra::{Isometry3, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

use crate::error::MotionError;
use crate::skeleton::SkeletonHierarchy;

/// One frame of a raw motion: root translation plus local joint rotations.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub root_translation: Vector3<f32>,
    pub rotations: Vec<UnitQuaternion<f32>>,
}

impl Pose {
    /// Identity rotations with the root at its rest offset.
    pub fn rest(skeleton: &SkeletonHierarchy) -> Self {
        Self {
            root_translation: skeleton.joint(0).offset,
            rotations: vec![UnitQuaternion::identity(); skeleton.len()],
        }
    }

    pub fn global_transforms(&self, skeleton: &SkeletonHierarchy) -> Vec<Isometry3<f32>> {
        skeleton.forward_kinematics(&self.root_translation, &self.rotations)
    }

    pub fn global_positions(&self, skeleton: &SkeletonHierarchy) -> Vec<Vector3<f32>> {
        self.global_transforms(skeleton)
            .into_iter()
            .map(|iso| iso.translation.vector)
            .collect()
    }
}

/// A skeleton plus an ordered, finite sequence of poses.
#[derive(Clone, Debug)]
pub struct Motion {
    pub skeleton: SkeletonHierarchy,
    /// Seconds per frame.
    pub frame_time: f32,
    poses: Vec<Pose>,
}

impl Motion {
    pub fn new(skeleton: SkeletonHierarchy, frame_time: f32) -> Self {
        Self {
            skeleton,
            frame_time,
            poses: Vec::new(),
        }
    }

    /// Append a frame; its rotation count must match the skeleton.
    pub fn push(&mut self, pose: Pose) -> Result<(), MotionError> {
        if pose.rotations.len() != self.skeleton.len() {
            return Err(MotionError::JointCountMismatch {
                expected: self.skeleton.len(),
                actual: pose.rotations.len(),
            });
        }
        self.poses.push(pose);
        Ok(())
    }

    pub fn num_frames(&self) -> usize {
        self.poses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.poses.is_empty()
    }

    pub fn poses(&self) -> &[Pose] {
        &self.poses
    }

    pub fn pose(&self, frame: usize) -> Option<&Pose> {
        self.poses.get(frame)
    }

    /// Keep at most `max_frames` frames.
    pub fn truncate(&mut self, max_frames: usize) {
        self.poses.truncate(max_frames);
    }

    pub fn fps(&self) -> f32 {
        if self.frame_time > 0.0 {
            self.frame_time.recip()
        } else {
            0.0
        }
    }

    /// Restartable iterator over absolute (global) joint transforms, one `Vec` per frame.
    pub fn global_frames(&self) -> impl Iterator<Item = Vec<Isometry3<f32>>> + Clone + '_ {
        self.poses
            .iter()
            .map(move |pose| pose.global_transforms(&self.skeleton))
    }

    /// Rescale skeleton offsets and root translations, e.g. for unit conversion.
    pub fn scale(&mut self, factor: f32) {
        self.skeleton.scale(factor);
        for pose in &mut self.poses {
            pose.root_translation *= factor;
        }
    }

    pub(crate) fn poses_mut(&mut self) -> &mut [Pose] {
        &mut self.poses
    }
}

/// Canonical per-frame state consumed by the graph encoder.
///
/// Every per-joint vector has one entry per skeleton joint.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PoseState {
    /// Local joint rotations.
    pub rotations: Vec<UnitQuaternion<f32>>,
    /// Local joint positions; the root entry is the root's global position.
    pub positions: Vec<Vector3<f32>>,
    /// Previous frame's local rotations (equal to `rotations` on frame 0).
    pub prev_rotations: Vec<UnitQuaternion<f32>>,
    pub root_position: Vector3<f32>,
    pub root_orientation: UnitQuaternion<f32>,
    /// Root displacement since the previous frame, in the previous root frame.
    pub root_linear_velocity: Vector3<f32>,
    /// Scaled-axis root rotation since the previous frame, in the previous root frame.
    pub root_angular_velocity: Vector3<f32>,
    pub contacts: Vec<bool>,
}

impl PoseState {
    pub fn num_joints(&self) -> usize {
        self.rotations.len()
    }

    /// Checks that every per-joint array matches `joint_count`.
    pub fn validate(&self, joint_count: usize) -> Result<(), MotionError> {
        for actual in [
            self.rotations.len(),
            self.positions.len(),
            self.prev_rotations.len(),
            self.contacts.len(),
        ] {
            if actual != joint_count {
                return Err(MotionError::JointCountMismatch {
                    expected: joint_count,
                    actual,
                });
            }
        }
        Ok(())
    }
}
