//! Graph batches: many graphs flattened into one node arena.
//!
//! Graph `i` owns rows `ptr[i]..ptr[i + 1]` of every per-node matrix.
//! `ptr` starts at 0 and is the running sum of per-graph node counts.

use std::ops::Range;
use std::sync::Arc;

use log::debug;

use crate::error::GraphError;
use crate::features::encode_node;
use crate::graph::{PoseGraph, SkeletonGraph};
use crate::layout::{FeatureLayout, STATIC_WIDTH};
use crate::stats::NormalizationStatistics;

/// Dense row-major `rows x width` matrix of node features.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct NodeMatrix {
    rows: usize,
    width: usize,
    data: Vec<f32>,
}

impl NodeMatrix {
    pub fn zeros(rows: usize, width: usize) -> Self {
        Self {
            rows,
            width,
            data: vec![0.0; rows * width],
        }
    }

    pub fn from_vec(rows: usize, width: usize, data: Vec<f32>) -> Result<Self, GraphError> {
        if data.len() != rows * width {
            return Err(GraphError::mismatch(format!(
                "{} values cannot form a {rows}x{width} matrix",
                data.len()
            )));
        }
        Ok(Self { rows, width, data })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn row(&self, index: usize) -> &[f32] {
        &self.data[index * self.width..(index + 1) * self.width]
    }

    pub fn row_mut(&mut self, index: usize) -> &mut [f32] {
        &mut self.data[index * self.width..(index + 1) * self.width]
    }

    fn push_row(&mut self, row: &[f32]) {
        self.data.extend_from_slice(row);
        self.rows += 1;
    }
}

/// Normalized pose features of a batch, with the layout that produced them.
#[derive(Clone, Debug, PartialEq)]
pub struct PoseFeatures {
    pub layout: FeatureLayout,
    pub matrix: NodeMatrix,
}

#[derive(Clone, Debug)]
pub struct GraphBatch {
    ptr: Vec<usize>,
    /// Per graph, index into `skeletons`.
    graph_skeletons: Vec<usize>,
    skeletons: Vec<Arc<SkeletonGraph>>,
    static_features: NodeMatrix,
    /// `(parent, child)` pairs in batch node indices.
    edge_index: Vec<(usize, usize)>,
    /// Absent for skeleton-only batches (rest-pose placeholder targets).
    pose: Option<PoseFeatures>,
}

impl GraphBatch {
    pub fn num_graphs(&self) -> usize {
        self.graph_skeletons.len()
    }

    pub fn num_nodes(&self) -> usize {
        self.ptr.last().copied().unwrap_or(0)
    }

    pub fn ptr(&self) -> &[usize] {
        &self.ptr
    }

    pub fn graph_range(&self, graph: usize) -> Range<usize> {
        self.ptr[graph]..self.ptr[graph + 1]
    }

    /// Position of graph `graph`'s skeleton in [`GraphBatch::skeletons`].
    pub fn skeleton_index(&self, graph: usize) -> usize {
        self.graph_skeletons[graph]
    }

    pub fn skeleton_of(&self, graph: usize) -> &Arc<SkeletonGraph> {
        &self.skeletons[self.graph_skeletons[graph]]
    }

    /// Distinct skeletons, in order of first appearance.
    pub fn skeletons(&self) -> &[Arc<SkeletonGraph>] {
        &self.skeletons
    }

    pub fn static_features(&self) -> &NodeMatrix {
        &self.static_features
    }

    pub fn edge_index(&self) -> &[(usize, usize)] {
        &self.edge_index
    }

    pub fn pose(&self) -> Option<&PoseFeatures> {
        self.pose.as_ref()
    }

    pub fn has_pose(&self) -> bool {
        self.pose.is_some()
    }

    /// Check every pointer and row-count invariant.
    pub fn validate(&self) -> Result<(), GraphError> {
        if self.ptr.len() != self.num_graphs() + 1 || self.ptr.first() != Some(&0) {
            return Err(GraphError::mismatch(format!(
                "pointer table of length {} for {} graphs",
                self.ptr.len(),
                self.num_graphs()
            )));
        }
        for graph in 0..self.num_graphs() {
            let expected = self.skeleton_of(graph).num_nodes();
            let range = self.graph_range(graph);
            if range.end < range.start || range.len() != expected {
                return Err(GraphError::mismatch(format!(
                    "graph {graph} spans {:?}, expected {expected} nodes",
                    range
                )));
            }
        }
        let nodes = self.num_nodes();
        if self.static_features.rows() != nodes || self.static_features.width() != STATIC_WIDTH {
            return Err(GraphError::mismatch(format!(
                "static features are {}x{}, expected {nodes}x{STATIC_WIDTH}",
                self.static_features.rows(),
                self.static_features.width()
            )));
        }
        if let Some(pose) = &self.pose {
            if pose.matrix.rows() != nodes || pose.matrix.width() != pose.layout.width() {
                return Err(GraphError::mismatch(format!(
                    "pose features are {}x{}, expected {nodes}x{}",
                    pose.matrix.rows(),
                    pose.matrix.width(),
                    pose.layout.width()
                )));
            }
        }
        if let Some(&(a, b)) = self.edge_index.iter().find(|(a, b)| *a >= nodes || *b >= nodes) {
            return Err(GraphError::mismatch(format!(
                "edge ({a}, {b}) outside {nodes} nodes"
            )));
        }
        Ok(())
    }
}

#[derive(Default)]
struct BatchBuilder {
    ptr: Vec<usize>,
    graph_skeletons: Vec<usize>,
    skeletons: Vec<Arc<SkeletonGraph>>,
    static_features: NodeMatrix,
    edge_index: Vec<(usize, usize)>,
}

impl BatchBuilder {
    fn new() -> Self {
        Self {
            ptr: vec![0],
            static_features: NodeMatrix::zeros(0, STATIC_WIDTH),
            ..Self::default()
        }
    }

    /// Append one graph's topology and static features; returns its first node index.
    fn push_graph(&mut self, skeleton: &Arc<SkeletonGraph>) -> usize {
        let slot = match self.skeletons.iter().position(|s| Arc::ptr_eq(s, skeleton)) {
            Some(i) => i,
            None => {
                self.skeletons.push(Arc::clone(skeleton));
                self.skeletons.len() - 1
            }
        };
        self.graph_skeletons.push(slot);

        let base = self.ptr.last().copied().unwrap_or(0);
        for node in 0..skeleton.num_nodes() {
            self.static_features.push_row(&skeleton.static_row(node));
        }
        self.edge_index
            .extend(skeleton.edges().iter().map(|&(p, c)| (base + p, base + c)));
        self.ptr.push(base + skeleton.num_nodes());
        base
    }

    fn finish(self, pose: Option<PoseFeatures>) -> Result<GraphBatch, GraphError> {
        if self.graph_skeletons.is_empty() {
            return Err(GraphError::EmptyBatch);
        }
        let batch = GraphBatch {
            ptr: self.ptr,
            graph_skeletons: self.graph_skeletons,
            skeletons: self.skeletons,
            static_features: self.static_features,
            edge_index: self.edge_index,
            pose,
        };
        batch.validate()?;
        debug!(
            "assembled batch: {} graphs, {} nodes, {} skeleton(s), pose={}",
            batch.num_graphs(),
            batch.num_nodes(),
            batch.skeletons.len(),
            batch.has_pose()
        );
        Ok(batch)
    }
}

/// Pack pose graphs, in order, encoding node rows with `layout` and `stats`.
pub fn assemble_pose_batch<I>(
    graphs: I,
    layout: &FeatureLayout,
    stats: &NormalizationStatistics,
) -> Result<GraphBatch, GraphError>
where
    I: IntoIterator<Item = PoseGraph>,
{
    let mut builder = BatchBuilder::new();
    let mut matrix = NodeMatrix::zeros(0, layout.width());
    let mut row = vec![0.0; layout.width()];
    for graph in graphs {
        let expected = graph.skeleton().num_nodes();
        if graph.num_nodes() != expected {
            return Err(GraphError::mismatch(format!(
                "pose graph has {} nodes, skeleton '{}' has {expected}",
                graph.num_nodes(),
                graph.skeleton().name()
            )));
        }
        builder.push_graph(graph.skeleton());
        for node in 0..expected {
            encode_node(&graph, node, layout, stats, &mut row);
            matrix.push_row(&row);
        }
    }
    builder.finish(Some(PoseFeatures {
        layout: layout.clone(),
        matrix,
    }))
}

/// Pack unposed skeletons; each stands in as a rest-pose placeholder graph.
pub fn assemble_skeleton_batch<'a, I>(skeletons: I) -> Result<GraphBatch, GraphError>
where
    I: IntoIterator<Item = &'a Arc<SkeletonGraph>>,
{
    let mut builder = BatchBuilder::new();
    for skeleton in skeletons {
        builder.push_graph(skeleton);
    }
    builder.finish(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::skeleton_to_graph;
    use nalgebra::Vector3;
    use same_motion_core::{Joint, SkeletonHierarchy};

    fn chain(n: usize) -> Arc<SkeletonGraph> {
        let joints = (0..n)
            .map(|i| {
                Joint::new(
                    format!("j{i}"),
                    i.checked_sub(1),
                    Vector3::new(0.0, 0.1 * i as f32, 0.0),
                )
            })
            .collect();
        Arc::new(skeleton_to_graph(&SkeletonHierarchy::new("c", joints).unwrap()))
    }

    #[test]
    fn pointer_is_running_sum() {
        let (a, b) = (chain(3), chain(5));
        let batch = assemble_skeleton_batch([&a, &b, &a]).unwrap();
        assert_eq!(batch.ptr(), &[0, 3, 8, 11]);
        assert_eq!(batch.num_nodes(), 11);
        assert_eq!(batch.skeletons().len(), 2);
        assert_eq!(batch.skeleton_index(2), 0);
        assert_eq!(batch.graph_range(1), 3..8);
        assert_eq!(batch.edge_index()[2], (3, 4));
        assert!(!batch.has_pose());
    }

    #[test]
    fn empty_batch_is_an_error() {
        let none: Vec<&Arc<SkeletonGraph>> = Vec::new();
        assert!(matches!(
            assemble_skeleton_batch(none),
            Err(GraphError::EmptyBatch)
        ));
    }

    #[test]
    fn matrix_shape_is_checked() {
        assert!(NodeMatrix::from_vec(2, 3, vec![0.0; 5]).is_err());
        let mut m = NodeMatrix::from_vec(2, 3, vec![0.0; 6]).unwrap();
        m.row_mut(1)[2] = 4.0;
        assert_eq!(m.row(1), &[0.0, 0.0, 4.0]);
    }
}
