use std::sync::Arc;

use criterion::{criterion_group, criterion_main, Criterion};
use same_graph_core::{
    assemble_pose_batch, gt_recon, motion_to_pose_graphs, skeleton_to_graph, FeatureLayout,
    NormalizationStatistics,
};
use same_motion_core::{bvh, normalize_motion, BvhOptions, HeightVelocityContact, NormalizeOptions};

pub fn encode_and_decode(c: &mut Criterion) {
    let path = same_test_fixtures::motions::path("walk-80").expect("walk-80 path");
    let motion = bvh::load(&path, &BvhOptions::default()).expect("load walk-80");
    let canonical = normalize_motion(
        &motion,
        &NormalizeOptions::default(),
        &HeightVelocityContact::default(),
    )
    .expect("normalize");
    let graph = Arc::new(skeleton_to_graph(&canonical.skeleton));
    let layout = FeatureLayout::default_input();
    let stats = NormalizationStatistics::identity();

    c.bench_function("assemble_pose_batch_80", |b| {
        b.iter(|| {
            let graphs = motion_to_pose_graphs(&graph, &canonical.poses).expect("graphs");
            assemble_pose_batch(graphs, &layout, &stats).expect("batch")
        })
    });

    let graphs = motion_to_pose_graphs(&graph, &canonical.poses).expect("graphs");
    let batch = assemble_pose_batch(graphs, &layout, &stats).expect("batch");
    c.bench_function("gt_recon_80", |b| b.iter(|| gt_recon(&batch, &stats).expect("decode")));
}

criterion_group!(benches, encode_and_decode);
criterion_main!(benches);
