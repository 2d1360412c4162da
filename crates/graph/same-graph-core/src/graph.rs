//! Skeleton graphs and per-frame pose graphs.
//!
//! Node `i` of every graph derived from a hierarchy is joint `i` of that
//! hierarchy. Pose graphs share their skeleton graph through an `Arc`, so all
//! frames of one skeleton have the same topology by construction.

use std::iter::FusedIterator;
use std::sync::Arc;

use hashbrown::HashMap;
use nalgebra::{UnitQuaternion, Vector3};
use same_motion_core::{PoseState, SkeletonHierarchy};

use crate::error::GraphError;
use crate::layout::{STATIC_END_EFFECTOR, STATIC_GLOBAL_OFFSET, STATIC_OFFSET, STATIC_WIDTH};

/// Static attributes of one skeleton node.
#[derive(Clone, Debug, PartialEq)]
pub struct SkeletonNode {
    pub offset: Vector3<f32>,
    pub global_offset: Vector3<f32>,
    pub end_effector: bool,
    pub rest_rotation: UnitQuaternion<f32>,
}

#[derive(Clone, Debug)]
pub struct SkeletonGraph {
    name: String,
    joint_names: Vec<String>,
    parents: Vec<Option<usize>>,
    nodes: Vec<SkeletonNode>,
    edges: Vec<(usize, usize)>,
    index: HashMap<String, usize>,
}

impl SkeletonGraph {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn nodes(&self) -> &[SkeletonNode] {
        &self.nodes
    }

    pub fn node(&self, index: usize) -> &SkeletonNode {
        &self.nodes[index]
    }

    pub fn joint_names(&self) -> &[String] {
        &self.joint_names
    }

    pub fn node_index(&self, joint_name: &str) -> Option<usize> {
        self.index.get(joint_name).copied()
    }

    pub fn parent(&self, index: usize) -> Option<usize> {
        self.parents[index]
    }

    /// Directed `(parent, child)` pairs.
    pub fn edges(&self) -> &[(usize, usize)] {
        &self.edges
    }

    /// Local offsets in node order.
    pub fn offsets(&self) -> impl ExactSizeIterator<Item = Vector3<f32>> + '_ {
        self.nodes.iter().map(|n| n.offset)
    }

    /// Ground-to-root height at rest.
    pub fn root_height(&self) -> f32 {
        self.nodes[0].global_offset.y
    }

    pub fn static_row(&self, index: usize) -> [f32; STATIC_WIDTH] {
        let node = &self.nodes[index];
        let mut row = [0.0; STATIC_WIDTH];
        row[STATIC_OFFSET].copy_from_slice(node.offset.as_slice());
        row[STATIC_GLOBAL_OFFSET].copy_from_slice(node.global_offset.as_slice());
        row[STATIC_END_EFFECTOR] = if node.end_effector { 1.0 } else { 0.0 };
        row
    }
}

/// Structural encoding of a hierarchy; one call per distinct skeleton.
pub fn skeleton_to_graph(hierarchy: &SkeletonHierarchy) -> SkeletonGraph {
    let nodes = hierarchy
        .joints()
        .iter()
        .enumerate()
        .map(|(i, joint)| SkeletonNode {
            offset: joint.offset,
            global_offset: hierarchy.rest_global_position(i),
            end_effector: hierarchy.is_end_effector(i),
            rest_rotation: joint.rotation,
        })
        .collect();
    let joint_names: Vec<String> = hierarchy.joints().iter().map(|j| j.name.clone()).collect();
    let index = joint_names
        .iter()
        .enumerate()
        .map(|(i, n)| (n.clone(), i))
        .collect();

    SkeletonGraph {
        name: hierarchy.name().to_string(),
        parents: hierarchy.joints().iter().map(|j| j.parent).collect(),
        joint_names,
        nodes,
        edges: hierarchy.edges(),
        index,
    }
}

/// Per-node pose attributes.
#[derive(Clone, Debug, PartialEq)]
pub struct PoseNode {
    pub rotation: UnitQuaternion<f32>,
    pub position: Vector3<f32>,
    pub prev_rotation: UnitQuaternion<f32>,
    pub contact: bool,
}

/// Root-only pose attributes.
#[derive(Clone, Debug, PartialEq)]
pub struct RootState {
    pub position: Vector3<f32>,
    pub orientation: UnitQuaternion<f32>,
    pub linear_velocity: Vector3<f32>,
    pub angular_velocity: Vector3<f32>,
}

impl RootState {
    pub fn height(&self) -> f32 {
        self.position.y
    }
}

/// A skeleton graph plus one frame of pose attributes.
#[derive(Clone, Debug)]
pub struct PoseGraph {
    skeleton: Arc<SkeletonGraph>,
    pub nodes: Vec<PoseNode>,
    pub root: RootState,
}

impl PoseGraph {
    pub fn from_state(skeleton: &Arc<SkeletonGraph>, state: &PoseState) -> Result<Self, GraphError> {
        check_state(skeleton, state)?;
        Ok(Self::from_checked(skeleton, state))
    }

    fn from_checked(skeleton: &Arc<SkeletonGraph>, state: &PoseState) -> Self {
        let nodes = (0..skeleton.num_nodes())
            .map(|i| PoseNode {
                rotation: state.rotations[i],
                position: state.positions[i],
                prev_rotation: state.prev_rotations[i],
                contact: state.contacts[i],
            })
            .collect();
        Self {
            skeleton: Arc::clone(skeleton),
            nodes,
            root: RootState {
                position: state.root_position,
                orientation: state.root_orientation,
                linear_velocity: state.root_linear_velocity,
                angular_velocity: state.root_angular_velocity,
            },
        }
    }

    pub fn skeleton(&self) -> &Arc<SkeletonGraph> {
        &self.skeleton
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }
}

fn check_state(skeleton: &SkeletonGraph, state: &PoseState) -> Result<(), GraphError> {
    state.validate(skeleton.num_nodes()).map_err(|e| {
        GraphError::mismatch(format!("pose state for '{}': {e}", skeleton.name()))
    })
}

/// Lazy, restartable sequence of pose graphs; clone it to iterate again.
#[derive(Clone, Debug)]
pub struct PoseGraphs<'a> {
    skeleton: Arc<SkeletonGraph>,
    states: std::slice::Iter<'a, PoseState>,
}

impl Iterator for PoseGraphs<'_> {
    type Item = PoseGraph;

    fn next(&mut self) -> Option<PoseGraph> {
        self.states
            .next()
            .map(|state| PoseGraph::from_checked(&self.skeleton, state))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.states.size_hint()
    }
}

impl ExactSizeIterator for PoseGraphs<'_> {}
impl FusedIterator for PoseGraphs<'_> {}

/// One pose graph per pose state. Every state is checked up front, so the
/// returned sequence itself cannot fail.
pub fn motion_to_pose_graphs<'a>(
    skeleton: &Arc<SkeletonGraph>,
    states: &'a [PoseState],
) -> Result<PoseGraphs<'a>, GraphError> {
    for state in states {
        check_state(skeleton, state)?;
    }
    Ok(PoseGraphs {
        skeleton: Arc::clone(skeleton),
        states: states.iter(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use same_motion_core::Joint;

    fn hierarchy() -> SkeletonHierarchy {
        SkeletonHierarchy::new(
            "t",
            vec![
                Joint::new("Hips", None, Vector3::new(0.0, 1.0, 0.0)),
                Joint::new("Spine", Some(0), Vector3::new(0.0, 0.25, 0.0)),
                Joint::new("LeftFoot", Some(0), Vector3::new(0.1, -0.9, 0.0)),
            ],
        )
        .unwrap()
    }

    fn state(n: usize) -> PoseState {
        PoseState {
            rotations: vec![UnitQuaternion::identity(); n],
            positions: vec![Vector3::zeros(); n],
            prev_rotations: vec![UnitQuaternion::identity(); n],
            root_position: Vector3::new(0.0, 1.0, 0.0),
            root_orientation: UnitQuaternion::identity(),
            root_linear_velocity: Vector3::zeros(),
            root_angular_velocity: Vector3::zeros(),
            contacts: vec![false; n],
        }
    }

    #[test]
    fn graph_mirrors_hierarchy() {
        let h = hierarchy();
        let g = skeleton_to_graph(&h);
        assert_eq!(g.num_nodes(), 3);
        assert_eq!(g.edges(), &[(0, 1), (0, 2)]);
        assert_eq!(g.node_index("LeftFoot"), Some(2));
        assert!(g.node(1).end_effector);
        assert!(!g.node(0).end_effector);
        let row = g.static_row(2);
        assert_eq!(&row[0..3], &[0.1, -0.9, 0.0]);
        assert_eq!(row[6], 1.0);
    }

    #[test]
    fn pose_graphs_are_lazy_and_restartable() {
        let g = Arc::new(skeleton_to_graph(&hierarchy()));
        let states = vec![state(3); 4];
        let graphs = motion_to_pose_graphs(&g, &states).unwrap();
        assert_eq!(graphs.len(), 4);
        assert_eq!(graphs.clone().count(), 4);
        for pg in graphs {
            assert_eq!(pg.num_nodes(), 3);
            assert!(Arc::ptr_eq(pg.skeleton(), &g));
        }
    }

    #[test]
    fn short_state_is_rejected() {
        let g = Arc::new(skeleton_to_graph(&hierarchy()));
        let states = vec![state(3), state(2)];
        let err = motion_to_pose_graphs(&g, &states).unwrap_err();
        assert!(matches!(err, GraphError::GraphBatchMismatch { .. }));
    }
}
