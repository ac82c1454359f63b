//! Distortion-corrected depth residual of the distortion-aware bundle.
//!
//! Evaluated at plain `f64`: the embedded quadrant-reconciliation solve makes
//! this residual unsuitable for autodiff, so the owning problem probes it with
//! finite differences.

use rgbd_calib_core::{
    DepthCloud, GlobalDistortionModel, PinholeIntrinsics, Poly2, Pt3, Real, GLOBAL_POLY_SIZE,
};

use crate::params::pose7_slice_to_iso3;

/// Per-view constants of the distortion residual.
#[derive(Debug, Clone)]
pub struct DistortionResidualView<'a> {
    /// Corner positions in the target frame.
    pub corners: &'a [Pt3],
    /// Inner-corner count along X, to pick the plane-spanning corners.
    pub target_cols: usize,
    /// Locally undistorted depth cloud of the view.
    pub cloud: &'a DepthCloud,
    /// Flat raster indices of the measured plane inliers.
    pub inliers: &'a [usize],
}

/// Distortion-corrected depth residuals for one view.
///
/// `color_pose7` maps color-frame points into the depth frame; `target_pose7`
/// maps target-frame corners into the color frame. `global_coeffs` holds the
/// nine free quadrant coefficients; the fourth quadrant is reconciled here, on
/// every call, with the current values. `delta` is `[sx, sy, dx, dy]` applied
/// to the nominal depth intrinsics. Three rows per inlier pixel: the offset
/// from the corrected point to the target plane along the point's line of
/// sight, normalized by `sqrt(inlier_count) * sigma(z)`.
#[allow(clippy::too_many_arguments)]
pub fn distortion_residuals(
    view: &DistortionResidualView<'_>,
    color_pose7: &[Real],
    target_pose7: &[Real],
    global_coeffs: &[Real],
    delta: &[Real],
    depth_intrinsics: &PinholeIntrinsics,
    error_poly: &Poly2,
    out: &mut [Real],
) {
    debug_assert_eq!(global_coeffs.len(), 3 * GLOBAL_POLY_SIZE);
    debug_assert_eq!(delta.len(), 4);
    debug_assert_eq!(out.len(), 3 * view.inliers.len());

    // Reconcile the fourth quadrant from the current free coefficients.
    let mut global = GlobalDistortionModel::identity(view.cloud.width(), view.cloud.height());
    global.set_free_coeffs(global_coeffs);

    // Target corners into the depth frame, and the plane they span.
    let color_pose = pose7_slice_to_iso3(color_pose7);
    let target_pose = pose7_slice_to_iso3(target_pose7);
    let to_depth = color_pose * target_pose;
    let c0 = to_depth * view.corners[0];
    let c1 = to_depth * view.corners[1];
    let c2 = to_depth * view.corners[view.target_cols];
    let Some(cb_plane) = rgbd_calib_core::Plane::through(&c0, &c1, &c2) else {
        // Corners collapsed under a degenerate probe pose; contribute nothing.
        out.fill(0.0);
        return;
    };

    let (sx, sy, dx, dy) = (delta[0], delta[1], delta[2], delta[3]);
    let k = depth_intrinsics;
    let width = view.cloud.width();
    let norm = (view.inliers.len() as Real).sqrt();

    for (i, &idx) in view.inliers.iter().enumerate() {
        let p = view.cloud.point(idx);
        let z = p.z;
        let (col, row) = (idx % width, idx / width);

        // Re-derive the viewing ray under the corrected intrinsics, keeping
        // the measured depth.
        let nx = (col as Real - (k.cx + dx)) / (k.fx * sx);
        let ny = (row as Real - (k.cy + dy)) / (k.fy * sy);
        let rescaled = Pt3::new(nx * z, ny * z, z);

        // Global inverse mapping along the line of sight.
        let corrected = global.undistort_point(col, row, &rescaled);

        let dir = corrected.coords.normalize();
        let hit = cb_plane.intersect_ray(&dir).unwrap_or(corrected);
        let sigma = norm * error_poly.eval(corrected.z);
        let diff = (hit - corrected) / sigma;
        out[3 * i] = diff.x;
        out[3 * i + 1] = diff.y;
        out[3 * i + 2] = diff.z;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::iso3_to_pose7;
    use rgbd_calib_core::synthetic::{plane_cloud, pose, target_plane};
    use rgbd_calib_core::{Checkerboard, DepthSensor, Iso3};

    #[test]
    fn identity_model_on_exact_plane_gives_zero_residual() {
        let k = PinholeIntrinsics::new(570.0, 570.0, 16.0, 12.0);
        let depth = DepthSensor::new(k);
        let target = Checkerboard::new("cb", 4, 3, 0.1);
        let target_pose = pose(0.0, 0.15, 0.0, -0.1, -0.1, 1.4);
        let cloud = plane_cloud(&depth, 32, 24, &target_plane(&target_pose));
        let inliers: Vec<usize> = (0..cloud.len()).collect();

        let view = DistortionResidualView {
            corners: &target.corners(),
            target_cols: target.cols,
            cloud: &cloud,
            inliers: &inliers,
        };

        let color_pose7 = iso3_to_pose7(&Iso3::identity());
        let target_pose7 = iso3_to_pose7(&target_pose);
        let identity = Poly2::identity();
        let coeffs: Vec<Real> = [identity; 3]
            .iter()
            .flat_map(|p| p.coeffs)
            .collect();

        let mut out = vec![0.0; 3 * inliers.len()];
        distortion_residuals(
            &view,
            color_pose7.as_slice(),
            target_pose7.as_slice(),
            &coeffs,
            &[1.0, 1.0, 0.0, 0.0],
            &k,
            depth.error_poly(),
            &mut out,
        );
        let max = out.iter().fold(0.0_f64, |m, r| m.max(r.abs()));
        assert!(max < 1e-6, "max residual {max}");
    }

    #[test]
    fn depth_scale_error_is_seen_by_the_residual() {
        let k = PinholeIntrinsics::new(570.0, 570.0, 16.0, 12.0);
        let depth = DepthSensor::new(k);
        let target = Checkerboard::new("cb", 4, 3, 0.1);
        let target_pose = pose(0.0, 0.0, 0.0, -0.15, -0.1, 1.5);
        // Measured cloud reports depths 5% short of the true plane.
        let true_cloud = plane_cloud(&depth, 32, 24, &target_plane(&target_pose));
        let measured = true_cloud.map_points(|_, _, p| Pt3::from(p.coords * 0.95));
        let inliers: Vec<usize> = (0..measured.len()).collect();

        let view = DistortionResidualView {
            corners: &target.corners(),
            target_cols: target.cols,
            cloud: &measured,
            inliers: &inliers,
        };

        let color_pose7 = iso3_to_pose7(&Iso3::identity());
        let target_pose7 = iso3_to_pose7(&target_pose);
        let identity_coeffs: Vec<Real> =
            [Poly2::identity(); 3].iter().flat_map(|p| p.coeffs).collect();
        // With the inverse curve `p(z) = z / 0.95` the residual must vanish.
        let fix = Poly2::new(0.0, 1.0 / 0.95, 0.0);
        let fix_coeffs: Vec<Real> = [fix; 3].iter().flat_map(|p| p.coeffs).collect();

        let mut with_identity = vec![0.0; 3 * inliers.len()];
        let mut with_fix = vec![0.0; 3 * inliers.len()];
        for (coeffs, out) in [
            (&identity_coeffs, &mut with_identity),
            (&fix_coeffs, &mut with_fix),
        ] {
            distortion_residuals(
                &view,
                color_pose7.as_slice(),
                target_pose7.as_slice(),
                coeffs,
                &[1.0, 1.0, 0.0, 0.0],
                &k,
                depth.error_poly(),
                out,
            );
        }
        let max_id = with_identity.iter().fold(0.0_f64, |m, r| m.max(r.abs()));
        let max_fix = with_fix.iter().fold(0.0_f64, |m, r| m.max(r.abs()));
        assert!(max_id > 0.1, "identity model should see the bias: {max_id}");
        assert!(max_fix < 1e-6, "corrective model should null it: {max_fix}");
    }
}
