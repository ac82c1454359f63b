//! Reprojection residual of the distortion-aware bundle (quaternion poses).

use rgbd_calib_core::{PinholeIntrinsics, Pt3, Real, Vec2};

use crate::params::pose7_slice_to_iso3;

/// Corner reprojection residuals for one view under a 7-vector target pose.
///
/// `pose7` maps target-frame corners into the color frame. Two rows per
/// corner, normalized by `pixel_noise * sqrt(corner_count)` so views with
/// different corner counts weigh equally.
pub fn reproj_residuals_pose7(
    intrinsics: &PinholeIntrinsics,
    corners: &[Pt3],
    image_corners: &[Vec2],
    pose7: &[Real],
    pixel_noise: Real,
    out: &mut [Real],
) {
    debug_assert_eq!(corners.len(), image_corners.len());
    debug_assert_eq!(out.len(), 2 * corners.len());

    let pose = pose7_slice_to_iso3(pose7);
    let scale = 1.0 / (pixel_noise * (corners.len() as Real).sqrt());
    for (i, (pw, uv)) in corners.iter().zip(image_corners).enumerate() {
        let proj = intrinsics.project(&(pose * pw));
        out[2 * i] = (proj.x - uv.x) * scale;
        out[2 * i + 1] = (proj.y - uv.y) * scale;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::iso3_to_pose7;
    use rgbd_calib_core::synthetic::{pose, project_corners};
    use rgbd_calib_core::{Checkerboard, ColorSensor, Iso3};

    #[test]
    fn exact_pose_gives_zero_residual() {
        let intrinsics = PinholeIntrinsics::new(520.0, 520.0, 310.0, 230.0);
        let color = ColorSensor::new(intrinsics);
        let target = Checkerboard::new("cb", 5, 4, 0.06);
        let target_pose = pose(0.1, -0.1, 0.05, 0.02, -0.04, 1.2);
        let observed = project_corners(&color, &Iso3::identity(), &target, &target_pose);

        let pose7 = iso3_to_pose7(&target_pose);
        let mut out = vec![0.0; 2 * target.num_corners()];
        reproj_residuals_pose7(
            &intrinsics,
            &target.corners(),
            &observed,
            pose7.as_slice(),
            0.5,
            &mut out,
        );
        assert!(out.iter().all(|r| r.abs() < 1e-9));
    }
}
