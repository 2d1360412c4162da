//! Skeleton hierarchy: a rooted joint tree with parent-relative offsets.
//!
//! Joint order is fixed at construction. The parent of a joint always has a
//! lower index than the joint itself, and this order is the index space every
//! graph derived from the hierarchy uses.

use hashbrown::HashMap;
use nalgebra::{Isometry3, Translation3, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

use crate::error::MotionError;

/// A single joint. `offset`/`rotation` describe the rest transform relative to the parent.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Joint {
    pub name: String,
    pub parent: Option<usize>,
    pub offset: Vector3<f32>,
    pub rotation: UnitQuaternion<f32>,
}

impl Joint {
    pub fn new(name: impl Into<String>, parent: Option<usize>, offset: Vector3<f32>) -> Self {
        Self {
            name: name.into(),
            parent,
            offset,
            rotation: UnitQuaternion::identity(),
        }
    }
}

/// Record of the root-height correction applied by the skeleton loader.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RootHeightCorrection {
    /// Vertical root offset as stored in the source file.
    pub original: f32,
    /// Ground-to-root height computed from the foot chain.
    pub corrected: f32,
}

#[derive(Clone, Debug)]
pub struct SkeletonHierarchy {
    name: String,
    joints: Vec<Joint>,
    children: Vec<Vec<usize>>,
    index: HashMap<String, usize>,
    rest_globals: Vec<Isometry3<f32>>,
    root_correction: Option<RootHeightCorrection>,
}

impl SkeletonHierarchy {
    /// Build a hierarchy, validating single root, parent-before-child order and unique names.
    pub fn new(name: impl Into<String>, joints: Vec<Joint>) -> Result<Self, MotionError> {
        if joints.is_empty() {
            return Err(MotionError::InvalidHierarchy {
                reason: "skeleton has no joints".into(),
            });
        }
        if joints[0].parent.is_some() {
            return Err(MotionError::InvalidHierarchy {
                reason: format!("first joint '{}' must be the root", joints[0].name),
            });
        }

        let mut children = vec![Vec::new(); joints.len()];
        let mut index = HashMap::with_capacity(joints.len());
        for (i, joint) in joints.iter().enumerate() {
            if i > 0 {
                match joint.parent {
                    None => {
                        return Err(MotionError::InvalidHierarchy {
                            reason: format!("joint '{}' is a second root", joint.name),
                        })
                    }
                    Some(p) if p >= i => {
                        return Err(MotionError::InvalidHierarchy {
                            reason: format!(
                                "parent {p} of joint '{}' does not precede it (index {i})",
                                joint.name
                            ),
                        })
                    }
                    Some(p) => children[p].push(i),
                }
            }
            if index.insert(joint.name.clone(), i).is_some() {
                return Err(MotionError::InvalidHierarchy {
                    reason: format!("duplicate joint name '{}'", joint.name),
                });
            }
        }

        let mut skeleton = Self {
            name: name.into(),
            joints,
            children,
            index,
            rest_globals: Vec::new(),
            root_correction: None,
        };
        skeleton.refresh_rest_globals();
        Ok(skeleton)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn joints(&self) -> &[Joint] {
        &self.joints
    }

    pub fn joint(&self, index: usize) -> &Joint {
        &self.joints[index]
    }

    pub fn len(&self) -> usize {
        self.joints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.joints.is_empty()
    }

    pub fn joint_index(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn parent(&self, index: usize) -> Option<usize> {
        self.joints[index].parent
    }

    pub fn children(&self, index: usize) -> &[usize] {
        &self.children[index]
    }

    /// Leaf joints are end-effectors.
    pub fn is_end_effector(&self, index: usize) -> bool {
        self.children[index].is_empty()
    }

    /// Parent-child links as `(parent, child)` index pairs, in child order.
    pub fn edges(&self) -> Vec<(usize, usize)> {
        self.joints
            .iter()
            .enumerate()
            .filter_map(|(i, j)| j.parent.map(|p| (p, i)))
            .collect()
    }

    /// Cached global rest transforms, recomputed whenever an offset changes.
    pub fn rest_globals(&self) -> &[Isometry3<f32>] {
        &self.rest_globals
    }

    pub fn rest_global_position(&self, index: usize) -> Vector3<f32> {
        self.rest_globals[index].translation.vector
    }

    pub fn root_correction(&self) -> Option<RootHeightCorrection> {
        self.root_correction
    }

    pub(crate) fn set_root_correction(&mut self, correction: RootHeightCorrection) {
        self.root_correction = Some(correction);
    }

    /// Overwrite the root offset and propagate to every cached global transform.
    pub fn set_root_offset(&mut self, offset: Vector3<f32>) {
        self.joints[0].offset = offset;
        self.refresh_rest_globals();
    }

    /// Multiply all offsets (and any recorded root correction) by `factor`.
    pub fn scale(&mut self, factor: f32) {
        for joint in &mut self.joints {
            joint.offset *= factor;
        }
        if let Some(c) = &mut self.root_correction {
            c.original *= factor;
            c.corrected *= factor;
        }
        self.refresh_rest_globals();
    }

    /// Global joint transforms for a pose given as root translation plus local rotations.
    pub fn forward_kinematics(
        &self,
        root_translation: &Vector3<f32>,
        rotations: &[UnitQuaternion<f32>],
    ) -> Vec<Isometry3<f32>> {
        let mut globals: Vec<Isometry3<f32>> = Vec::with_capacity(self.joints.len());
        for (i, joint) in self.joints.iter().enumerate() {
            let rotation = match rotations.get(i) {
                Some(r) => joint.rotation * r,
                None => joint.rotation,
            };
            match joint.parent {
                None => globals.push(Isometry3::from_parts(
                    Translation3::from(*root_translation),
                    rotation,
                )),
                Some(p) => {
                    let local = Isometry3::from_parts(Translation3::from(joint.offset), rotation);
                    let global = globals[p] * local;
                    globals.push(global);
                }
            }
        }
        globals
    }

    fn refresh_rest_globals(&mut self) {
        let root = self.joints[0].offset;
        self.rest_globals = self.forward_kinematics(&root, &[]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain() -> Vec<Joint> {
        vec![
            Joint::new("Hips", None, Vector3::new(0.0, 1.0, 0.0)),
            Joint::new("Spine", Some(0), Vector3::new(0.0, 0.2, 0.0)),
            Joint::new("Head", Some(1), Vector3::new(0.0, 0.3, 0.0)),
            Joint::new("Leg", Some(0), Vector3::new(0.1, -0.5, 0.0)),
        ]
    }

    #[test]
    fn builds_children_and_end_effectors() {
        let skel = SkeletonHierarchy::new("test", chain()).unwrap();
        assert_eq!(skel.len(), 4);
        assert_eq!(skel.children(0), &[1, 3]);
        assert!(skel.is_end_effector(2));
        assert!(skel.is_end_effector(3));
        assert!(!skel.is_end_effector(1));
        assert_eq!(skel.edges(), vec![(0, 1), (1, 2), (0, 3)]);
        assert_eq!(skel.joint_index("Head"), Some(2));
    }

    #[test]
    fn rest_globals_accumulate_offsets() {
        let skel = SkeletonHierarchy::new("test", chain()).unwrap();
        let head = skel.rest_global_position(2);
        assert!((head.y - 1.5).abs() < 1e-6);
        let leg = skel.rest_global_position(3);
        assert!((leg.x - 0.1).abs() < 1e-6);
        assert!((leg.y - 0.5).abs() < 1e-6);
    }

    #[test]
    fn root_offset_propagates() {
        let mut skel = SkeletonHierarchy::new("test", chain()).unwrap();
        skel.set_root_offset(Vector3::new(0.0, 2.0, 0.0));
        assert!((skel.rest_global_position(2).y - 2.5).abs() < 1e-6);
    }

    #[test]
    fn rejects_bad_hierarchies() {
        let mut joints = chain();
        joints[2].parent = Some(3);
        assert!(SkeletonHierarchy::new("bad", joints).is_err());

        let mut joints = chain();
        joints[1].parent = None;
        assert!(SkeletonHierarchy::new("bad", joints).is_err());

        let mut joints = chain();
        joints[3].name = "Spine".into();
        assert!(SkeletonHierarchy::new("bad", joints).is_err());

        assert!(SkeletonHierarchy::new("bad", Vec::new()).is_err());
    }

    #[test]
    fn forward_kinematics_applies_parent_rotation() {
        let skel = SkeletonHierarchy::new("test", chain()).unwrap();
        let mut rotations = vec![UnitQuaternion::identity(); 4];
        rotations[0] = UnitQuaternion::from_axis_angle(&Vector3::z_axis(), std::f32::consts::FRAC_PI_2);
        let globals = skel.forward_kinematics(&Vector3::zeros(), &rotations);
        // spine offset (0, 0.2, 0) rotated 90 degrees about z lands on -x
        let spine = globals[1].translation.vector;
        assert!((spine.x + 0.2).abs() < 1e-6);
        assert!(spine.y.abs() < 1e-6);
    }
}
