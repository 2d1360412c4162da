use approx::assert_relative_eq;
use same_motion_core::nalgebra::{UnitQuaternion, Vector3};
use same_motion_core::{
    assemble_motion, bvh, load_skeleton, normalize_motion, BvhOptions, DecodedFrame, FootAnchor,
    HeightVelocityContact, MotionError, NormalizeOptions,
};

#[test]
fn walk_fixture_loads_with_promoted_end_sites() {
    let path = same_test_fixtures::motions::path("walk-80").expect("walk-80 path");
    let motion = bvh::load(&path, &BvhOptions::default()).expect("load walk-80");

    let frames = same_test_fixtures::motions::frames("walk-80")
        .expect("manifest entry")
        .expect("frame count");
    assert_eq!(motion.num_frames(), frames);
    assert_eq!(motion.skeleton.name(), "walk_80");
    assert_eq!(motion.skeleton.len(), 22);
    for end in ["Head_End", "LeftToeBase_End", "RightForeArm_End"] {
        let j = motion.skeleton.joint_index(end).expect(end);
        assert!(motion.skeleton.is_end_effector(j));
    }
    assert_relative_eq!(motion.frame_time, 0.0333333, epsilon = 1e-7);
}

#[test]
fn target_skeleton_is_corrected_to_foot_chain_height() {
    let path = same_test_fixtures::skeletons::path("abe").expect("abe path");
    let skeleton = load_skeleton(&path, &BvhOptions::default()).expect("load abe");

    let (anchor, toe) = FootAnchor::locate(&skeleton).expect("anchor");
    assert_eq!(anchor, FootAnchor::LeftToeEnd);
    assert_relative_eq!(skeleton.joint(0).offset.y, 1.05, epsilon = 1e-5);
    assert_relative_eq!(skeleton.rest_global_position(toe).y, 0.0, epsilon = 1e-5);

    let correction = skeleton.root_correction().expect("correction recorded");
    assert_relative_eq!(correction.original, 0.0);
}

#[test]
fn skeleton_without_feet_is_a_topology_error() {
    let path = same_test_fixtures::skeletons::path("no-feet").expect("no-feet path");
    let err = load_skeleton(&path, &BvhOptions::default()).unwrap_err();
    assert!(matches!(err, MotionError::SkeletonTopology { .. }));
    assert_eq!(err.category(), "skeleton_topology");
}

#[test]
fn normalized_walk_has_one_state_per_frame() {
    let path = same_test_fixtures::motions::path("walk-12").expect("walk-12 path");
    let motion = bvh::load(&path, &BvhOptions::default()).expect("load walk-12");
    let canonical = normalize_motion(
        &motion,
        &NormalizeOptions::default(),
        &HeightVelocityContact::default(),
    )
    .expect("normalize");

    assert_eq!(canonical.num_frames(), 12);
    assert_relative_eq!(canonical.skeleton.joint(0).offset.y, 0.95, epsilon = 1e-5);
    for state in &canonical.poses {
        state.validate(canonical.num_joints()).expect("per-joint arrays");
        // non-candidate joints never carry contact
        assert!(!state.contacts[0]);
    }
    // walking forward along +Z at 0.025 per frame
    let v = canonical.poses[1].root_linear_velocity;
    assert_relative_eq!(v.z, 0.025, epsilon = 2e-3);
}

#[test]
fn assembled_motion_round_trips_through_bvh() {
    let path = same_test_fixtures::skeletons::path("abe").expect("abe path");
    let skeleton = load_skeleton(&path, &BvhOptions::default()).expect("load abe");
    let n = skeleton.len();
    let frames: Vec<DecodedFrame> = (0..5)
        .map(|t| DecodedFrame {
            root_position: Vector3::new(0.0, 1.05, 0.1 * t as f32),
            rotations: vec![UnitQuaternion::identity(); n],
            positions: vec![Vector3::zeros(); n],
            contacts: vec![false; n],
        })
        .collect();
    let motion = assemble_motion(&frames, &skeleton, 1.0 / 30.0).expect("assemble");

    let dir = tempfile::tempdir().expect("tempdir");
    let out = dir.path().join("abe_out.bvh");
    bvh::save(&motion, &out).expect("save");
    let reloaded = bvh::load(&out, &BvhOptions::default()).expect("reload");
    assert_eq!(reloaded.num_frames(), 5);
    assert_eq!(reloaded.skeleton.len(), n);
    assert_relative_eq!(reloaded.skeleton.joint(0).offset.y, 0.0, epsilon = 1e-6);
    assert_relative_eq!(reloaded.poses()[4].root_translation.z, 0.4, epsilon = 1e-5);
}
