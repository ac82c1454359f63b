//! Synthetic RGB-D scenes for the workspace test suites.
//!
//! Public so integration tests of the optimizer and pipeline crates can build
//! noise-free ground-truth data; not intended for production use.

use image::RgbImage;
use nalgebra::{Translation3, UnitQuaternion};

use crate::{
    Checkerboard, CheckerboardView, ColorSensor, DepthCloud, DepthSensor, Frame, Iso3, Plane,
    PlaneFit, Pt3, Real, Vec2, Vec3,
};

/// A pose from Euler angles (radians) and a translation.
pub fn pose(rx: Real, ry: Real, rz: Real, tx: Real, ty: Real, tz: Real) -> Iso3 {
    Iso3::from_parts(
        Translation3::new(tx, ty, tz),
        UnitQuaternion::from_euler_angles(rx, ry, rz),
    )
}

/// The plane of a target's Z = 0 grid under `target_pose` (reference frame).
pub fn target_plane(target_pose: &Iso3) -> Plane {
    let normal = target_pose.rotation * Vec3::z();
    let point = target_pose * Pt3::origin();
    Plane::new(normal, -normal.dot(&point.coords))
}

/// Project target corners into the color image.
///
/// `color_pose` maps color-frame points into the depth frame; `target_pose` is
/// the target pose in the depth frame.
pub fn project_corners(
    color: &ColorSensor,
    color_pose: &Iso3,
    target: &Checkerboard,
    target_pose: &Iso3,
) -> Vec<Vec2> {
    let target_in_color = color_pose.inverse() * target_pose;
    target
        .corners()
        .iter()
        .map(|p| color.project(&(target_in_color * p)))
        .collect()
}

/// An organized cloud sampling `plane` through every pixel of the depth sensor.
pub fn plane_cloud(depth: &DepthSensor, width: usize, height: usize, plane: &Plane) -> DepthCloud {
    let mut points = Vec::with_capacity(width * height);
    let nan = Real::NAN;
    for row in 0..height {
        for col in 0..width {
            let ray = depth.ray(&Vec2::new(col as Real, row as Real));
            match plane.intersect_ray(&ray) {
                Some(p) if p.z > 0.0 => points.push(p),
                _ => points.push(Pt3::new(nan, nan, nan)),
            }
        }
    }
    DepthCloud::from_points(width, height, points).expect("dimensions match by construction")
}

/// A noise-free view of `target` at `target_pose`, with an exact plane fit over
/// the given inlier indices (all cloud cells when `inliers` is `None`).
#[allow(clippy::too_many_arguments)]
pub fn exact_view(
    frame_id: usize,
    color: &ColorSensor,
    color_pose: &Iso3,
    depth: &DepthSensor,
    target: &Checkerboard,
    target_pose: &Iso3,
    cloud: &DepthCloud,
    inliers: Option<Vec<usize>>,
) -> CheckerboardView {
    let plane = target_plane(target_pose);
    let inliers = inliers.unwrap_or_else(|| {
        (0..cloud.len())
            .filter(|&i| crate::cloud::is_finite(cloud.point(i)))
            .collect()
    });
    // Exact data: fit noise is the sensor noise floor, not zero, so that
    // residual normalization stays finite.
    let std_dev = depth.depth_error(target_pose.translation.z.max(0.5));
    CheckerboardView {
        id: format!("frame{frame_id}_{}", target.name),
        frame_id,
        target: target.clone(),
        color_corners: project_corners(color, color_pose, target, target_pose),
        color_target_pose: color_pose.inverse() * target_pose,
        depth_plane: Some(PlaneFit {
            plane,
            inliers,
            std_dev,
        }),
    }
}

/// A frame with a black image and a plane-sampling cloud for `target_pose`.
pub fn plane_frame(
    id: usize,
    width: usize,
    height: usize,
    depth: &DepthSensor,
    target_pose: &Iso3,
) -> Frame {
    let plane = target_plane(target_pose);
    Frame {
        id,
        image: RgbImage::new(width as u32, height as u32),
        cloud: plane_cloud(depth, width, height, &plane),
    }
}
