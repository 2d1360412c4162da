//! Motion normalization: raw frames to canonical [`PoseState`]s.
//!
//! The source skeleton is root-height corrected, the trajectory is moved so
//! frame 0 starts at the horizontal origin (optionally facing +Z), and every
//! frame gets root velocities relative to the previous frame. Frame 0 has
//! zero velocity and uses its own rotations as the previous rotations.

use log::debug;
use nalgebra::{UnitQuaternion, Vector3};

use crate::config::NormalizeOptions;
use crate::contact::ContactRule;
use crate::error::MotionError;
use crate::loader::correct_root_height;
use crate::pose::{Motion, Pose, PoseState};
use crate::skeleton::SkeletonHierarchy;

/// A normalized motion: corrected skeleton plus one [`PoseState`] per frame.
#[derive(Clone, Debug)]
pub struct CanonicalMotion {
    pub skeleton: SkeletonHierarchy,
    pub frame_time: f32,
    pub poses: Vec<PoseState>,
}

impl CanonicalMotion {
    pub fn num_frames(&self) -> usize {
        self.poses.len()
    }

    pub fn num_joints(&self) -> usize {
        self.skeleton.len()
    }
}

pub fn normalize_motion(
    motion: &Motion,
    options: &NormalizeOptions,
    contact: &dyn ContactRule,
) -> Result<CanonicalMotion, MotionError> {
    if motion.is_empty() {
        return Err(MotionError::EmptyMotion);
    }

    let mut motion = motion.clone();
    if options.unit_scale != 1.0 {
        motion.scale(options.unit_scale);
    }
    correct_root_height(&mut motion.skeleton)?;
    canonicalize_root(&mut motion, options.align_heading);

    let skeleton = &motion.skeleton;
    let world: Vec<Vec<Vector3<f32>>> = motion
        .poses()
        .iter()
        .map(|pose| pose.global_positions(skeleton))
        .collect();
    let contacts = contact.label(skeleton, &world, motion.frame_time);
    let offsets: Vec<Vector3<f32>> = skeleton.joints().iter().map(|j| j.offset).collect();
    let root_rest = skeleton.joint(0).rotation;

    let mut poses = Vec::with_capacity(motion.num_frames());
    let mut previous: Option<&Pose> = None;
    for (pose, contacts) in motion.poses().iter().zip(contacts) {
        let root_orientation = root_rest * pose.rotations[0];
        let (linear, angular, prev_rotations) = match previous {
            None => (Vector3::zeros(), Vector3::zeros(), pose.rotations.clone()),
            Some(prev) => {
                let inv = (root_rest * prev.rotations[0]).inverse();
                (
                    inv * (pose.root_translation - prev.root_translation),
                    (inv * root_orientation).scaled_axis(),
                    prev.rotations.clone(),
                )
            }
        };

        let mut positions = offsets.clone();
        positions[0] = pose.root_translation;

        let state = PoseState {
            rotations: pose.rotations.clone(),
            positions,
            prev_rotations,
            root_position: pose.root_translation,
            root_orientation,
            root_linear_velocity: linear,
            root_angular_velocity: angular,
            contacts,
        };
        state.validate(skeleton.len())?;
        poses.push(state);
        previous = Some(pose);
    }

    debug!(
        "normalized '{}': {} frames x {} joints",
        skeleton.name(),
        poses.len(),
        skeleton.len()
    );
    Ok(CanonicalMotion {
        skeleton: motion.skeleton.clone(),
        frame_time: motion.frame_time,
        poses,
    })
}

/// Heading of a root orientation: yaw of its forward (+Z) axis about +Y.
pub fn heading(orientation: &UnitQuaternion<f32>) -> f32 {
    let forward = orientation * Vector3::z();
    forward.x.atan2(forward.z)
}

fn canonicalize_root(motion: &mut Motion, align_heading: bool) {
    let root_rest = motion.skeleton.joint(0).rotation;
    let Some(first) = motion.pose(0) else {
        return;
    };
    let origin = Vector3::new(first.root_translation.x, 0.0, first.root_translation.z);
    let align = if align_heading {
        UnitQuaternion::from_axis_angle(&Vector3::y_axis(), -heading(&(root_rest * first.rotations[0])))
    } else {
        UnitQuaternion::identity()
    };
    // global root = rest * local; pre-multiplying the global by `align` changes the local by conjugation
    let local_align = root_rest.inverse() * align * root_rest;

    for pose in motion.poses_mut() {
        pose.root_translation = align * (pose.root_translation - origin);
        pose.rotations[0] = local_align * pose.rotations[0];
    }
}
