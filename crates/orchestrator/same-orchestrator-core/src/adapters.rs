//! Built-in inference adapters and checkpoint selection.

use std::sync::Arc;

use anyhow::{bail, Result};
use hashbrown::HashMap;
use log::{info, warn};
use nalgebra::{UnitQuaternion, Vector3};
use same_graph_core::features::{read_rotation, read_vec3, write_rotation};
use same_graph_core::{
    FeatureLayout, GraphBatch, InferenceAdapter, InferenceError, NormalizationStatistics,
    PoseField, RawOutput, SkeletonGraph,
};

use crate::config::ModelConfig;

/// Checkpoint id of [`NameMatchAdapter`].
pub const NAME_MATCH: &str = "name-match";

/// Denormalized attributes of one feature row.
#[derive(Default)]
struct RowValues {
    rotation: Option<UnitQuaternion<f32>>,
    position: Option<Vector3<f32>>,
    linear_velocity: Option<Vector3<f32>>,
    angular_velocity: Option<Vector3<f32>>,
    height: Option<f32>,
    contact: Option<bool>,
}

fn read_row(layout: &FeatureLayout, stats: &NormalizationStatistics, row: &[f32]) -> RowValues {
    let mut values = RowValues::default();
    let mut buf = row.to_vec();
    for (field, cols) in layout.columns() {
        let slot = &mut buf[cols];
        stats.denormalize(field, slot);
        match field {
            PoseField::Rotation | PoseField::Rotation6d => values.rotation = Some(read_rotation(slot)),
            PoseField::Position => values.position = Some(read_vec3(slot)),
            PoseField::RootLinearVelocity => values.linear_velocity = Some(read_vec3(slot)),
            PoseField::RootAngularVelocity => values.angular_velocity = Some(read_vec3(slot)),
            PoseField::RootHeight => values.height = Some(slot[0]),
            PoseField::Contact => values.contact = Some(slot[0] > 0.5),
            PoseField::PrevRotation => {}
        }
    }
    values
}

/// Copies source joint rotations and contacts onto same-named target joints.
///
/// Root velocity and height are scaled by the target/source rest root-height
/// ratio. Target joints with no same-named source joint keep the identity
/// rotation.
pub struct NameMatchAdapter {
    stats: Arc<NormalizationStatistics>,
    output: FeatureLayout,
}

impl NameMatchAdapter {
    pub fn new(stats: Arc<NormalizationStatistics>, output: FeatureLayout) -> Self {
        Self { stats, output }
    }

    /// For each target node, the same-named source node.
    fn joint_map(source: &SkeletonGraph, target: &SkeletonGraph) -> Vec<Option<usize>> {
        let map: Vec<Option<usize>> = target
            .joint_names()
            .iter()
            .map(|name| source.node_index(name))
            .collect();
        let unmatched: Vec<&str> = target
            .joint_names()
            .iter()
            .zip(&map)
            .filter(|(_, m)| m.is_none())
            .map(|(n, _)| n.as_str())
            .collect();
        if !unmatched.is_empty() {
            warn!(
                "{} of {} '{}' joints have no match in '{}': {:?}",
                unmatched.len(),
                target.num_nodes(),
                target.name(),
                source.name(),
                unmatched
            );
        }
        map
    }
}

impl InferenceAdapter for NameMatchAdapter {
    fn checkpoint(&self) -> &str {
        NAME_MATCH
    }

    fn infer(&self, source: &GraphBatch, target: &GraphBatch) -> Result<RawOutput, InferenceError> {
        let pose = source.pose().ok_or_else(|| InferenceError::Input {
            reason: "source batch carries no pose features".into(),
        })?;
        if source.num_graphs() != target.num_graphs() {
            return Err(InferenceError::Input {
                reason: format!(
                    "source has {} graphs, target has {}",
                    source.num_graphs(),
                    target.num_graphs()
                ),
            });
        }

        let stats = self.stats.as_ref();
        let mut out = RawOutput::zeros(target.num_nodes(), self.output.width());
        let mut maps: HashMap<(usize, usize), Vec<Option<usize>>> = HashMap::new();

        for graph in 0..target.num_graphs() {
            let src_skel = source.skeleton_of(graph);
            let tgt_skel = target.skeleton_of(graph);
            let map = maps
                .entry((source.skeleton_index(graph), target.skeleton_index(graph)))
                .or_insert_with(|| Self::joint_map(src_skel, tgt_skel));

            let src_range = source.graph_range(graph);
            let tgt_range = target.graph_range(graph);
            let ratio = if src_skel.root_height().abs() > f32::EPSILON {
                tgt_skel.root_height() / src_skel.root_height()
            } else {
                1.0
            };
            let src_root = read_row(&pose.layout, stats, pose.matrix.row(src_range.start));

            for (local, row) in tgt_range.enumerate() {
                let src = map[local]
                    .map(|s| read_row(&pose.layout, stats, pose.matrix.row(src_range.start + s)));
                let rotation = src
                    .as_ref()
                    .and_then(|v| v.rotation)
                    .unwrap_or_else(UnitQuaternion::identity);
                let contact = src.as_ref().and_then(|v| v.contact).unwrap_or(false);

                let slots = out.row_mut(row);
                for (field, cols) in self.output.columns() {
                    let slot = &mut slots[cols];
                    if field.root_only() && local != 0 {
                        continue;
                    }
                    match field {
                        PoseField::Rotation | PoseField::Rotation6d | PoseField::PrevRotation => {
                            write_rotation(&rotation, slot)
                        }
                        PoseField::Position if local == 0 => {
                            let p = src_root
                                .position
                                .map(|p| p * ratio)
                                .unwrap_or_else(|| Vector3::new(0.0, tgt_skel.root_height(), 0.0));
                            slot.copy_from_slice(p.as_slice());
                        }
                        PoseField::Position => {
                            slot.copy_from_slice(tgt_skel.node(local).offset.as_slice())
                        }
                        PoseField::RootLinearVelocity => {
                            let v = src_root.linear_velocity.unwrap_or_else(Vector3::zeros) * ratio;
                            slot.copy_from_slice(v.as_slice());
                        }
                        PoseField::RootAngularVelocity => {
                            let w = src_root.angular_velocity.unwrap_or_else(Vector3::zeros);
                            slot.copy_from_slice(w.as_slice());
                        }
                        PoseField::RootHeight => {
                            slot[0] = src_root
                                .height
                                .map_or(tgt_skel.root_height(), |h| h * ratio)
                        }
                        PoseField::Contact => slot[0] = if contact { 1.0 } else { 0.0 },
                    }
                    stats.normalize(field, slot);
                }
            }
        }
        Ok(out)
    }
}

/// Build the adapter named by `config.checkpoint`. Unknown checkpoints fail here, at startup.
pub fn load_model(
    config: &ModelConfig,
    stats: Arc<NormalizationStatistics>,
    output: &FeatureLayout,
) -> Result<Box<dyn InferenceAdapter>> {
    if config.device != "cpu" {
        bail!(
            "device '{}' is not available for checkpoint '{}'",
            config.device,
            config.checkpoint
        );
    }
    match config.checkpoint.as_str() {
        NAME_MATCH => {
            info!("loaded checkpoint '{NAME_MATCH}' on {}", config.device);
            Ok(Box::new(NameMatchAdapter::new(stats, output.clone())))
        }
        other => bail!("unknown checkpoint '{other}'"),
    }
}
