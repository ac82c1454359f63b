//! Integration tests for the distortion-free joint optimizer.

use rgbd_calib_core::synthetic::{pose, project_corners, target_plane};
use rgbd_calib_core::{Checkerboard, ColorSensor, Iso3, PinholeIntrinsics};
use rgbd_calib_optim::{optimize_extrinsics, ExtrinsicsOptions, ExtrinsicsView};

fn make_views(
    color: &ColorSensor,
    color_pose_gt: &Iso3,
    target: &Checkerboard,
    target_poses: &[Iso3],
) -> Vec<ExtrinsicsView> {
    target_poses
        .iter()
        .map(|target_pose| ExtrinsicsView {
            corners: target.corners(),
            image_corners: project_corners(color, color_pose_gt, target, target_pose),
            target_pose: color_pose_gt.inverse() * target_pose,
            plane: target_plane(target_pose),
        })
        .collect()
}

fn pose_error(a: &Iso3, b: &Iso3) -> (f64, f64) {
    let diff = a.inverse() * b;
    (diff.translation.vector.norm(), diff.rotation.angle())
}

#[test]
fn exact_views_converge_to_ground_truth() {
    let intrinsics = PinholeIntrinsics::new(540.0, 540.0, 320.0, 240.0);
    let color = ColorSensor::new(intrinsics);
    let color_pose_gt = pose(0.01, -0.015, 0.005, -0.025, 0.002, 0.004);
    let target = Checkerboard::new("cb", 5, 4, 0.08);

    // Tilted planes with normals spanning all three axes, so the transform is
    // fully observable from the plane constraints.
    let target_poses = [
        pose(0.3, 0.0, 0.0, 0.0, 0.1, 1.4),
        pose(0.0, 0.35, 0.1, -0.2, 0.0, 1.6),
        pose(-0.25, -0.2, 0.0, 0.15, -0.1, 1.8),
        pose(0.1, 0.25, -0.1, 0.05, 0.2, 1.2),
    ];
    let views = make_views(&color, &color_pose_gt, &target, &target_poses);

    // Start a few millimetres and a fraction of a degree off.
    let initial = pose(0.0, 0.0, 0.0, -0.02, 0.0, 0.0);
    let result =
        optimize_extrinsics(&views, &initial, &intrinsics, &ExtrinsicsOptions::default())
            .expect("solve failed");

    let (t_err, r_err) = pose_error(&result.color_pose, &color_pose_gt);
    assert!(t_err < 1e-6, "translation error {t_err}");
    assert!(r_err < 1e-6, "rotation error {r_err}");
    assert!(result.final_cost < 1e-8, "final cost {}", result.final_cost);

    for (refined, target_pose) in result.target_poses.iter().zip(&target_poses) {
        let gt = color_pose_gt.inverse() * target_pose;
        let (t_err, r_err) = pose_error(refined, &gt);
        assert!(t_err < 1e-6 && r_err < 1e-6);
    }
}

#[test]
fn cauchy_loss_contains_a_corrupted_plane() {
    let intrinsics = PinholeIntrinsics::new(540.0, 540.0, 320.0, 240.0);
    let color = ColorSensor::new(intrinsics);
    let color_pose_gt = pose(0.0, 0.0, 0.0, -0.025, 0.0, 0.0);
    let target = Checkerboard::new("cb", 5, 4, 0.08);

    let target_poses = [
        pose(0.3, 0.0, 0.0, 0.0, 0.1, 1.4),
        pose(0.0, 0.35, 0.1, -0.2, 0.0, 1.6),
        pose(-0.25, -0.2, 0.0, 0.15, -0.1, 1.8),
        pose(0.1, 0.25, -0.1, 0.05, 0.2, 1.2),
        pose(-0.1, 0.15, 0.2, -0.05, 0.15, 1.5),
    ];
    let mut views = make_views(&color, &color_pose_gt, &target, &target_poses);
    // One badly fitted plane, 10 cm off along its normal.
    views[2].plane.d += 0.1;

    let initial = pose(0.0, 0.0, 0.0, -0.02, 0.0, 0.0);
    let result =
        optimize_extrinsics(&views, &initial, &intrinsics, &ExtrinsicsOptions::default())
            .expect("solve failed");

    let (t_err, r_err) = pose_error(&result.color_pose, &color_pose_gt);
    assert!(t_err < 5e-3, "translation error {t_err}");
    assert!(r_err < 5e-3, "rotation error {r_err}");
}

#[test]
fn cauchy_loss_beats_plain_least_squares_on_a_corner_outlier() {
    let intrinsics = PinholeIntrinsics::new(540.0, 540.0, 320.0, 240.0);
    let color = ColorSensor::new(intrinsics);
    let color_pose_gt = pose(0.0, 0.0, 0.0, -0.025, 0.0, 0.0);
    let target = Checkerboard::new("cb", 5, 4, 0.08);

    let target_poses = [
        pose(0.3, 0.0, 0.0, 0.0, 0.1, 1.4),
        pose(0.0, 0.35, 0.1, -0.2, 0.0, 1.6),
        pose(-0.25, -0.2, 0.0, 0.15, -0.1, 1.8),
        pose(0.1, 0.25, -0.1, 0.05, 0.2, 1.2),
    ];
    let mut views = make_views(&color, &color_pose_gt, &target, &target_poses);
    // One corner detection 50 sigma off at the default 0.5 px noise.
    views[1].image_corners[3].x += 25.0;

    let initial = pose(0.0, 0.0, 0.0, -0.02, 0.0, 0.0);
    let robust =
        optimize_extrinsics(&views, &initial, &intrinsics, &ExtrinsicsOptions::default())
            .expect("robust solve failed");
    let plain = optimize_extrinsics(
        &views,
        &initial,
        &intrinsics,
        &ExtrinsicsOptions {
            cauchy_scale: None,
            ..ExtrinsicsOptions::default()
        },
    )
    .expect("plain solve failed");

    let (t_robust, r_robust) = pose_error(&robust.color_pose, &color_pose_gt);
    let (t_plain, r_plain) = pose_error(&plain.color_pose, &color_pose_gt);
    assert!(
        t_robust < t_plain && r_robust < r_plain,
        "robust ({t_robust}, {r_robust}) vs plain ({t_plain}, {r_plain})"
    );
    assert!(t_robust < 1e-3, "translation error {t_robust}");
}

#[test]
fn empty_view_set_is_rejected() {
    let intrinsics = PinholeIntrinsics::new(540.0, 540.0, 320.0, 240.0);
    let result = optimize_extrinsics(
        &[],
        &Iso3::identity(),
        &intrinsics,
        &ExtrinsicsOptions::default(),
    );
    assert!(result.is_err());
}
