//! Frames and checkerboard views.

use image::RgbImage;

use crate::{Checkerboard, DepthCloud, Iso3, Plane, Real, Vec2};

/// One synchronized color image + depth cloud pair.
///
/// Created once at ingestion (where the depth cloud may be replaced by a
/// block-averaged version) and never mutated afterwards. `id` increases
/// monotonically with ingestion order.
#[derive(Debug, Clone)]
pub struct Frame {
    pub id: usize,
    pub image: RgbImage,
    pub cloud: DepthCloud,
}

/// A fitted depth plane with its supporting evidence.
#[derive(Debug, Clone)]
pub struct PlaneFit {
    /// The plane in the depth frame.
    pub plane: Plane,
    /// Flat raster indices of the inlier cloud points.
    pub inliers: Vec<usize>,
    /// Standard deviation of the inlier point-to-plane distances.
    pub std_dev: Real,
}

/// One observed instance of a checkerboard in one frame.
///
/// Couples the target, the detected 2D corners in the color image, the target
/// pose estimated from the color detection, and (when available) the plane
/// fitted to the matching depth-cloud region. Views without a fitted plane are
/// excluded from plane-based stages rather than carried with degenerate data.
#[derive(Debug, Clone)]
pub struct CheckerboardView {
    /// Identifier, derived from the frame and target ids.
    pub id: String,
    /// Ingestion id of the source frame.
    pub frame_id: usize,
    /// The observed target.
    pub target: Checkerboard,
    /// Detected corner pixels in the color image, in target corner order.
    pub color_corners: Vec<Vec2>,
    /// Target pose estimated from the color detection (target → color frame).
    pub color_target_pose: Iso3,
    /// Plane fitted to the depth-cloud region, if extraction succeeded.
    pub depth_plane: Option<PlaneFit>,
}

impl CheckerboardView {
    /// True when a depth plane was successfully fitted.
    pub fn has_plane(&self) -> bool {
        self.depth_plane.is_some()
    }

    /// Replace the plane-fit evidence, keeping the rest of the view.
    pub fn set_plane(&mut self, fit: PlaneFit) {
        self.depth_plane = Some(fit);
    }
}
