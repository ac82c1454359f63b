//! Per-view residual of the distortion-free joint optimizer.

use nalgebra::{DVector, RealField, Vector3};
use rgbd_calib_core::math::rotate_axis_angle;
use rgbd_calib_core::sensors::project_pinhole;
use rgbd_calib_core::{PinholeIntrinsics, Plane, Poly2, Pt3, Real, Vec2};
use tiny_solver::factors::Factor;

/// Joint reprojection + depth-plane residual for one checkerboard view.
///
/// Parameter blocks: `[color_pose6, target_pose6]`, both axis-angle +
/// translation. `target_pose6` maps target-frame corners into the color frame;
/// `color_pose6` maps color-frame points into the depth frame. Per corner the
/// residual contributes two reprojection rows scaled by `1 / pixel_noise` and
/// one signed plane-distance row scaled by the depth noise at the corner's
/// range.
#[derive(Debug, Clone)]
pub struct TransformFactor {
    /// Corner positions in the target frame.
    pub corners: Vec<Pt3>,
    /// Detected corner pixels in the color image.
    pub image_corners: Vec<Vec2>,
    /// Color camera intrinsics.
    pub intrinsics: PinholeIntrinsics,
    /// Plane fitted to the matching depth region, in the depth frame.
    pub plane: Plane,
    /// Depth noise as a function of range.
    pub error_poly: Poly2,
    /// Expected corner detection noise in pixels.
    pub pixel_noise: Real,
}

impl TransformFactor {
    /// Residual dimension: three rows per corner.
    pub fn residual_dim(&self) -> usize {
        3 * self.corners.len()
    }

    fn residual_generic<T: RealField>(
        &self,
        color_pose: &DVector<T>,
        target_pose: &DVector<T>,
    ) -> DVector<T> {
        debug_assert_eq!(color_pose.len(), 6);
        debug_assert_eq!(target_pose.len(), 6);

        let aa_color = Vector3::new(
            color_pose[0].clone(),
            color_pose[1].clone(),
            color_pose[2].clone(),
        );
        let t_color = Vector3::new(
            color_pose[3].clone(),
            color_pose[4].clone(),
            color_pose[5].clone(),
        );
        let aa_target = Vector3::new(
            target_pose[0].clone(),
            target_pose[1].clone(),
            target_pose[2].clone(),
        );
        let t_target = Vector3::new(
            target_pose[3].clone(),
            target_pose[4].clone(),
            target_pose[5].clone(),
        );

        let fx = T::from_f64(self.intrinsics.fx).unwrap();
        let fy = T::from_f64(self.intrinsics.fy).unwrap();
        let cx = T::from_f64(self.intrinsics.cx).unwrap();
        let cy = T::from_f64(self.intrinsics.cy).unwrap();
        let inv_noise = T::from_f64(1.0 / self.pixel_noise).unwrap();

        let normal = Vector3::new(
            T::from_f64(self.plane.normal.x).unwrap(),
            T::from_f64(self.plane.normal.y).unwrap(),
            T::from_f64(self.plane.normal.z).unwrap(),
        );
        let offset = T::from_f64(self.plane.d).unwrap();

        let mut residuals = DVector::zeros(self.residual_dim());
        for (i, (pw, uv)) in self.corners.iter().zip(&self.image_corners).enumerate() {
            let pw_t = Vector3::new(
                T::from_f64(pw.x).unwrap(),
                T::from_f64(pw.y).unwrap(),
                T::from_f64(pw.z).unwrap(),
            );

            // Target frame -> color frame, then project.
            let p_color = rotate_axis_angle(&aa_target, &pw_t) + t_target.clone();
            let proj = project_pinhole(fx.clone(), fy.clone(), cx.clone(), cy.clone(), &p_color);
            residuals[3 * i] =
                (proj.x.clone() - T::from_f64(uv.x).unwrap()) * inv_noise.clone();
            residuals[3 * i + 1] =
                (proj.y.clone() - T::from_f64(uv.y).unwrap()) * inv_noise.clone();

            // Color frame -> depth frame, then measure against the fitted plane.
            let p_depth = rotate_axis_angle(&aa_color, &p_color) + t_color.clone();
            let dist = normal.dot(&p_depth) + offset.clone();
            let sigma = self.error_poly.eval_generic(p_depth.z.clone());
            residuals[3 * i + 2] = dist / sigma;
        }
        residuals
    }
}

impl<T: RealField> Factor<T> for TransformFactor {
    fn residual_func(&self, params: &[DVector<T>]) -> DVector<T> {
        debug_assert_eq!(params.len(), 2, "expected [color_pose, target_pose]");
        self.residual_generic(&params[0], &params[1])
    }
}
