//! Raw model output (or a batch's own pose features) back to decoded frames.
//!
//! Graph `i` of the batch is read from rows `ptr[i]..ptr[i + 1]`; root-only
//! fields come from row `ptr[i]`. Values are denormalized, quaternions are
//! renormalized and contacts are thresholded at 0.5.
//!
//! The root trajectory restarts at the horizontal origin whenever the
//! skeleton changes between consecutive graphs, and otherwise integrates the
//! root linear velocity in the previous frame's root orientation. Height
//! comes from `RootHeight` when present, then from the root `Position` row.

use nalgebra::{UnitQuaternion, Vector3};
use same_motion_core::DecodedFrame;

use crate::batch::{GraphBatch, NodeMatrix};
use crate::error::GraphError;
use crate::features::{read_rotation, read_vec3};
use crate::inference::RawOutput;
use crate::layout::{FeatureLayout, PoseField, STATIC_GLOBAL_OFFSET, STATIC_OFFSET};
use crate::stats::NormalizationStatistics;

/// Decode model output laid out per `layout` against the target batch.
pub fn decode_output(
    raw: &RawOutput,
    target: &GraphBatch,
    layout: &FeatureLayout,
    stats: &NormalizationStatistics,
) -> Result<Vec<DecodedFrame>, GraphError> {
    target.validate()?;
    if raw.rows() != target.num_nodes() || raw.width() != layout.width() {
        return Err(GraphError::mismatch(format!(
            "model output is {}x{}, target batch needs {}x{}",
            raw.rows(),
            raw.width(),
            target.num_nodes(),
            layout.width()
        )));
    }
    Ok(decode_rows(raw, target, layout, stats))
}

/// Reconstruct frames from the batch's own pose features.
///
/// Skeleton-only batches fall back to [`rest_pose_recon`].
pub fn gt_recon(
    batch: &GraphBatch,
    stats: &NormalizationStatistics,
) -> Result<Vec<DecodedFrame>, GraphError> {
    batch.validate()?;
    match batch.pose() {
        Some(pose) => Ok(decode_rows(&pose.matrix, batch, &pose.layout, stats)),
        None => rest_pose_recon(batch),
    }
}

/// Single rest-pose frame of the batch's first skeleton, root placed at its rest height.
pub fn rest_pose_recon(batch: &GraphBatch) -> Result<Vec<DecodedFrame>, GraphError> {
    batch.validate()?;
    let statics = batch.static_features();
    let range = batch.graph_range(0);
    let height = statics.row(range.start)[STATIC_GLOBAL_OFFSET][1];
    let root_position = Vector3::new(0.0, height, 0.0);

    let mut positions: Vec<Vector3<f32>> = range
        .clone()
        .map(|row| read_vec3(&statics.row(row)[STATIC_OFFSET]))
        .collect();
    positions[0] = root_position;
    Ok(vec![DecodedFrame {
        root_position,
        rotations: vec![UnitQuaternion::identity(); range.len()],
        positions,
        contacts: vec![false; range.len()],
    }])
}

#[derive(Default)]
struct RootFields {
    linear_velocity: Option<Vector3<f32>>,
    height: Option<f32>,
    position: Option<Vector3<f32>>,
}

struct RootTrajectory {
    skeleton: Option<usize>,
    position: Vector3<f32>,
    orientation: UnitQuaternion<f32>,
}

impl RootTrajectory {
    fn new() -> Self {
        Self {
            skeleton: None,
            position: Vector3::zeros(),
            orientation: UnitQuaternion::identity(),
        }
    }

    fn advance(
        &mut self,
        skeleton: usize,
        root: &RootFields,
        orientation: UnitQuaternion<f32>,
        rest_height: f32,
    ) -> Vector3<f32> {
        let restart = self.skeleton != Some(skeleton);
        let mut position = match (restart, root.linear_velocity, root.position) {
            (true, Some(_), _) | (true, None, None) => Vector3::new(0.0, rest_height, 0.0),
            (false, Some(v), _) => self.position + self.orientation * v,
            (_, None, Some(p)) => p,
            (false, None, None) => self.position,
        };
        if let Some(h) = root.height {
            position.y = h;
        } else if let Some(p) = root.position {
            position.y = p.y;
        }

        self.skeleton = Some(skeleton);
        self.position = position;
        self.orientation = orientation;
        position
    }
}

fn decode_rows(
    matrix: &NodeMatrix,
    batch: &GraphBatch,
    layout: &FeatureLayout,
    stats: &NormalizationStatistics,
) -> Vec<DecodedFrame> {
    let mut frames = Vec::with_capacity(batch.num_graphs());
    let mut trajectory = RootTrajectory::new();
    let mut buf = vec![0.0; layout.width()];

    for graph in 0..batch.num_graphs() {
        let skeleton = batch.skeleton_of(graph);
        let range = batch.graph_range(graph);
        let n = range.len();
        let mut rotations = vec![UnitQuaternion::identity(); n];
        let mut positions: Vec<Vector3<f32>> = skeleton.offsets().collect();
        let mut contacts = vec![false; n];
        let mut root = RootFields::default();

        for (local, row) in range.enumerate() {
            buf.copy_from_slice(matrix.row(row));
            for (field, cols) in layout.columns() {
                if field.root_only() && local != 0 {
                    continue;
                }
                let slot = &mut buf[cols];
                stats.denormalize(field, slot);
                match field {
                    PoseField::Rotation | PoseField::Rotation6d => {
                        rotations[local] = read_rotation(slot)
                    }
                    PoseField::Position => {
                        let p = read_vec3(slot);
                        if local == 0 {
                            root.position = Some(p);
                        }
                        positions[local] = p;
                    }
                    PoseField::RootLinearVelocity => root.linear_velocity = Some(read_vec3(slot)),
                    PoseField::RootHeight => root.height = Some(slot[0]),
                    PoseField::Contact => contacts[local] = slot[0] > 0.5,
                    PoseField::PrevRotation | PoseField::RootAngularVelocity => {}
                }
            }
        }

        let orientation = skeleton.node(0).rest_rotation * rotations[0];
        let root_position = trajectory.advance(
            batch.skeleton_index(graph),
            &root,
            orientation,
            skeleton.root_height(),
        );
        positions[0] = root_position;
        frames.push(DecodedFrame {
            root_position,
            rotations,
            positions,
            contacts,
        });
    }
    frames
}
