//! Decoded frames back to a playable [`Motion`] on the target skeleton.

use nalgebra::{UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

use crate::error::MotionError;
use crate::pose::{Motion, Pose};
use crate::skeleton::SkeletonHierarchy;

/// One decoded output frame, in pipeline coordinates (ground at y = 0).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DecodedFrame {
    pub root_position: Vector3<f32>,
    pub rotations: Vec<UnitQuaternion<f32>>,
    /// Local joint positions; the root entry mirrors `root_position`.
    ///
    /// Not read by [`assemble_motion`]: BVH joints carry no per-frame
    /// translation, so the output keeps the target skeleton's offsets.
    pub positions: Vec<Vector3<f32>>,
    pub contacts: Vec<bool>,
}

impl DecodedFrame {
    pub fn num_joints(&self) -> usize {
        self.rotations.len()
    }
}

/// Build the output motion, restoring the root offset the file declared before correction.
pub fn assemble_motion(
    frames: &[DecodedFrame],
    target: &SkeletonHierarchy,
    frame_time: f32,
) -> Result<Motion, MotionError> {
    if frames.is_empty() {
        return Err(MotionError::EmptyMotion);
    }

    let mut skeleton = target.clone();
    if let Some(correction) = target.root_correction() {
        let mut offset = skeleton.joint(0).offset;
        offset.y = correction.original;
        skeleton.set_root_offset(offset);
    }

    let mut motion = Motion::new(skeleton, frame_time);
    for frame in frames {
        motion.push(Pose {
            root_translation: frame.root_position,
            rotations: frame.rotations.clone(),
        })?;
    }
    Ok(motion)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::correct_root_height;
    use crate::skeleton::Joint;

    fn target() -> SkeletonHierarchy {
        let mut skel = SkeletonHierarchy::new(
            "target",
            vec![
                Joint::new("Hips", None, Vector3::new(0.0, 40.0, 0.0)),
                Joint::new("LeftFoot", Some(0), Vector3::new(0.0, -0.8, 0.0)),
                Joint::new("LeftFoot_End", Some(1), Vector3::new(0.0, -0.1, 0.1)),
            ],
        )
        .unwrap();
        correct_root_height(&mut skel).unwrap();
        skel
    }

    fn frame(x: f32) -> DecodedFrame {
        DecodedFrame {
            root_position: Vector3::new(x, 0.9, 0.0),
            rotations: vec![UnitQuaternion::identity(); 3],
            positions: vec![Vector3::zeros(); 3],
            contacts: vec![false; 3],
        }
    }

    #[test]
    fn restores_original_root_offset() {
        let skel = target();
        assert!((skel.joint(0).offset.y - 0.9).abs() < 1e-5);
        let motion = assemble_motion(&[frame(0.0), frame(1.0)], &skel, 1.0 / 30.0).unwrap();
        assert_eq!(motion.num_frames(), 2);
        assert!((motion.skeleton.joint(0).offset.y - 40.0).abs() < 1e-5);
        assert!((motion.poses()[1].root_translation.x - 1.0).abs() < 1e-6);
        assert_eq!(motion.global_frames().count(), 2);
    }

    #[test]
    fn joint_offsets_come_from_the_target_skeleton() {
        let skel = target();
        let mut stretched = frame(0.0);
        stretched.positions = vec![Vector3::new(5.0, 5.0, 5.0); 3];
        let motion = assemble_motion(&[stretched], &skel, 0.1).unwrap();
        for joint in 1..skel.len() {
            assert_eq!(motion.skeleton.joint(joint).offset, skel.joint(joint).offset);
        }
        let global = motion.pose(0).unwrap().global_positions(&motion.skeleton);
        assert!((global[1] - Vector3::new(0.0, 0.1, 0.0)).norm() < 1e-5);
    }

    #[test]
    fn rejects_empty_and_mismatched_frames() {
        let skel = target();
        assert!(matches!(
            assemble_motion(&[], &skel, 0.1),
            Err(MotionError::EmptyMotion)
        ));
        let mut bad = frame(0.0);
        bad.rotations.pop();
        assert!(matches!(
            assemble_motion(&[bad], &skel, 0.1),
            Err(MotionError::JointCountMismatch { expected: 3, actual: 2 })
        ));
    }
}
