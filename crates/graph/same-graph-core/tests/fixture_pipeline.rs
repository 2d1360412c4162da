use std::sync::Arc;

use approx::{assert_abs_diff_eq, assert_relative_eq};
use same_graph_core::{
    assemble_pose_batch, assemble_skeleton_batch, gt_recon, motion_to_pose_graphs,
    skeleton_to_graph, FeatureLayout, NormalizationStatistics, PoseField,
};
use same_motion_core::{
    bvh, load_skeleton, normalize_motion, BvhOptions, CanonicalMotion, HeightVelocityContact,
    NormalizeOptions, SkeletonHierarchy,
};

fn walk(name: &str) -> CanonicalMotion {
    let path = same_test_fixtures::motions::path(name).expect("motion path");
    let motion = bvh::load(&path, &BvhOptions::default()).expect("load motion");
    normalize_motion(
        &motion,
        &NormalizeOptions::default(),
        &HeightVelocityContact::default(),
    )
    .expect("normalize")
}

fn abe() -> SkeletonHierarchy {
    let path = same_test_fixtures::skeletons::path("abe").expect("abe path");
    load_skeleton(&path, &BvhOptions::default()).expect("load abe")
}

fn ms_dict() -> NormalizationStatistics {
    let json = same_test_fixtures::statistics::json("ms-dict").expect("ms-dict");
    NormalizationStatistics::from_json(&json).expect("parse ms-dict")
}

#[test]
fn skeleton_graph_keeps_offsets_bit_exact() {
    let skeleton = abe();
    let graph = skeleton_to_graph(&skeleton);
    assert_eq!(graph.num_nodes(), skeleton.len());
    assert_eq!(graph.edges(), skeleton.edges().as_slice());
    for (offset, joint) in graph.offsets().zip(skeleton.joints()) {
        assert_eq!(offset, joint.offset);
    }
}

#[test]
fn one_pose_graph_per_frame() {
    let canonical = walk("walk-12");
    let graph = Arc::new(skeleton_to_graph(&canonical.skeleton));
    let graphs = motion_to_pose_graphs(&graph, &canonical.poses).expect("pose graphs");
    assert_eq!(graphs.len(), 12);
    assert!(graphs.clone().all(|g| g.num_nodes() == canonical.num_joints()));
    assert_eq!(graphs.count(), 12);
}

#[test]
fn mixed_skeleton_batch_pointer_is_running_sum() {
    let canonical = walk("walk-12");
    let source = Arc::new(skeleton_to_graph(&canonical.skeleton));
    let target = Arc::new(skeleton_to_graph(&abe()));
    let batch = assemble_skeleton_batch([&source, &target, &source]).expect("batch");
    let (j0, j1) = (source.num_nodes(), target.num_nodes());
    assert_eq!(batch.ptr(), &[0, j0, j0 + j1, 2 * j0 + j1]);
    assert_eq!(batch.num_nodes(), 2 * j0 + j1);
    assert_eq!(batch.static_features().rows(), batch.num_nodes());
}

#[test]
fn ground_truth_reconstruction_reproduces_the_source() {
    let canonical = walk("walk-12");
    let graph = Arc::new(skeleton_to_graph(&canonical.skeleton));
    let layout = FeatureLayout::default_input();
    let stats = ms_dict();
    let graphs = motion_to_pose_graphs(&graph, &canonical.poses).expect("pose graphs");
    let batch = assemble_pose_batch(graphs, &layout, &stats).expect("batch");
    assert_eq!(batch.num_graphs(), 12);

    // root height is stored normalized
    let height_col = layout.range_of(PoseField::RootHeight).expect("root height column");
    let stored = batch.pose().expect("pose features").matrix.row(0)[height_col.start];
    let h0 = canonical.poses[0].root_position.y;
    assert_relative_eq!(stored, (h0 - 0.95) / 0.1, epsilon = 1e-4);

    let frames = gt_recon(&batch, &stats).expect("gt recon");
    assert_eq!(frames.len(), 12);
    for (frame, state) in frames.iter().zip(&canonical.poses) {
        assert_relative_eq!(frame.root_position, state.root_position, epsilon = 1e-4);
        for (a, b) in frame.rotations.iter().zip(&state.rotations) {
            assert_abs_diff_eq!(*a, *b, epsilon = 1e-4);
        }
        assert_eq!(frame.contacts, state.contacts);
    }
}
