//! Conversions between pose attributes and feature-row slices.

use nalgebra::{Matrix3, Quaternion, Rotation3, UnitQuaternion, Vector3};

use crate::graph::PoseGraph;
use crate::layout::{FeatureLayout, PoseField};
use crate::stats::NormalizationStatistics;

const EPS: f32 = 1e-8;

/// Write `q` as `x y z w` (4 values) or as two rotation-matrix columns (6 values).
pub fn write_rotation(q: &UnitQuaternion<f32>, slot: &mut [f32]) {
    if slot.len() == 6 {
        // matrix columns are the rotated basis vectors
        let x = q * Vector3::x();
        let y = q * Vector3::y();
        slot[0..3].copy_from_slice(x.as_slice());
        slot[3..6].copy_from_slice(y.as_slice());
    } else {
        slot.copy_from_slice(q.coords.as_slice());
    }
}

/// Inverse of [`write_rotation`]. Degenerate input decodes to identity.
pub fn read_rotation(slot: &[f32]) -> UnitQuaternion<f32> {
    if slot.len() == 6 {
        return rotation_from_6d(slot);
    }
    let q = Quaternion::new(slot[3], slot[0], slot[1], slot[2]);
    UnitQuaternion::try_new(q, EPS).unwrap_or_else(UnitQuaternion::identity)
}

fn rotation_from_6d(slot: &[f32]) -> UnitQuaternion<f32> {
    let a = Vector3::new(slot[0], slot[1], slot[2]);
    let b = Vector3::new(slot[3], slot[4], slot[5]);
    let Some(x) = a.try_normalize(EPS) else {
        return UnitQuaternion::identity();
    };
    let Some(y) = (b - x * x.dot(&b)).try_normalize(EPS) else {
        return UnitQuaternion::identity();
    };
    let z = x.cross(&y);
    let m = Rotation3::from_matrix_unchecked(Matrix3::from_columns(&[x, y, z]));
    UnitQuaternion::from_rotation_matrix(&m)
}

pub fn read_vec3(slot: &[f32]) -> Vector3<f32> {
    Vector3::new(slot[0], slot[1], slot[2])
}

/// Encode node `node` of `graph` into `row` following `layout`, then normalize each field.
pub(crate) fn encode_node(
    graph: &PoseGraph,
    node: usize,
    layout: &FeatureLayout,
    stats: &NormalizationStatistics,
    row: &mut [f32],
) {
    let pose = &graph.nodes[node];
    let is_root = node == 0;
    for (field, range) in layout.columns() {
        let slot = &mut row[range];
        if field.root_only() && !is_root {
            slot.fill(0.0);
            continue;
        }
        match field {
            PoseField::Rotation | PoseField::Rotation6d => write_rotation(&pose.rotation, slot),
            PoseField::PrevRotation => write_rotation(&pose.prev_rotation, slot),
            PoseField::Position => slot.copy_from_slice(pose.position.as_slice()),
            PoseField::RootLinearVelocity => {
                slot.copy_from_slice(graph.root.linear_velocity.as_slice())
            }
            PoseField::RootAngularVelocity => {
                slot.copy_from_slice(graph.root.angular_velocity.as_slice())
            }
            PoseField::RootHeight => slot[0] = graph.root.height(),
            PoseField::Contact => slot[0] = if pose.contact { 1.0 } else { 0.0 },
        }
        stats.normalize(field, slot);
    }
}
