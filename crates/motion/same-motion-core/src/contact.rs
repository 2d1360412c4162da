//! Ground-contact labelling.

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::skeleton::SkeletonHierarchy;

/// Decides per frame, per joint, whether the joint touches the ground.
pub trait ContactRule {
    /// `positions[frame][joint]` are world-space joint positions (ground at y = 0).
    fn label(
        &self,
        skeleton: &SkeletonHierarchy,
        positions: &[Vec<Vector3<f32>>],
        frame_time: f32,
    ) -> Vec<Vec<bool>>;
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContactOptions {
    /// Maximum joint height above ground, in skeleton units.
    pub height_threshold: f32,
    /// Maximum joint speed, in skeleton units per second.
    pub velocity_threshold: f32,
    /// A joint is a contact candidate when its name contains any of these.
    pub joint_patterns: Vec<String>,
}

impl Default for ContactOptions {
    fn default() -> Self {
        Self {
            height_threshold: 0.05,
            velocity_threshold: 0.6,
            joint_patterns: vec!["Foot".into(), "Toe".into()],
        }
    }
}

/// Height + speed threshold on foot and toe joints.
#[derive(Clone, Debug, Default)]
pub struct HeightVelocityContact {
    pub options: ContactOptions,
}

impl HeightVelocityContact {
    pub fn new(options: ContactOptions) -> Self {
        Self { options }
    }

    fn is_candidate(&self, name: &str) -> bool {
        self.options
            .joint_patterns
            .iter()
            .any(|p| name.contains(p.as_str()))
    }
}

impl ContactRule for HeightVelocityContact {
    fn label(
        &self,
        skeleton: &SkeletonHierarchy,
        positions: &[Vec<Vector3<f32>>],
        frame_time: f32,
    ) -> Vec<Vec<bool>> {
        let dt = if frame_time > 0.0 { frame_time } else { 1.0 };
        let candidates: Vec<bool> = skeleton
            .joints()
            .iter()
            .map(|j| self.is_candidate(&j.name))
            .collect();

        let mut labels = Vec::with_capacity(positions.len());
        for (t, frame) in positions.iter().enumerate() {
            // frame 0 borrows the 0 -> 1 displacement
            let (a, b) = match t {
                0 if positions.len() > 1 => (&positions[0], &positions[1]),
                0 => (frame, frame),
                _ => (&positions[t - 1], frame),
            };
            let row = candidates
                .iter()
                .enumerate()
                .map(|(j, &candidate)| {
                    candidate
                        && frame[j].y < self.options.height_threshold
                        && (b[j] - a[j]).norm() / dt < self.options.velocity_threshold
                })
                .collect();
            labels.push(row);
        }
        labels
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skeleton::Joint;

    #[test]
    fn only_low_slow_feet_are_in_contact() {
        let skel = SkeletonHierarchy::new(
            "s",
            vec![
                Joint::new("Hips", None, Vector3::new(0.0, 1.0, 0.0)),
                Joint::new("LeftFoot", Some(0), Vector3::new(0.0, -1.0, 0.0)),
                Joint::new("RightFoot", Some(0), Vector3::new(0.0, -1.0, 0.0)),
            ],
        )
        .unwrap();
        let frames = vec![
            vec![Vector3::new(0.0, 1.0, 0.0), Vector3::new(0.0, 0.0, 0.0), Vector3::new(0.0, 0.2, 0.0)],
            vec![Vector3::new(0.0, 1.0, 0.0), Vector3::new(0.0, 0.0, 0.0), Vector3::new(0.0, 0.01, 0.5)],
        ];
        let labels = HeightVelocityContact::default().label(&skel, &frames, 1.0 / 30.0);
        assert_eq!(labels.len(), 2);
        // hips never, planted left foot always
        assert_eq!(labels[0], vec![false, true, false]);
        // right foot is low on frame 1 but moving fast
        assert_eq!(labels[1], vec![false, true, false]);
    }
}
