//! Color and depth sensor models.
//!
//! Both sensors are pinhole devices. The depth sensor is the reference frame of
//! the pair (identity pose); the color sensor's pose relative to it is the
//! primary unknown of the calibration. The depth sensor additionally carries a
//! range-dependent noise polynomial used to normalize depth residuals.

use nalgebra::{RealField, Vector2, Vector3};
use serde::{Deserialize, Serialize};

use crate::{Iso3, Mat3, Poly2, Pt3, Real, Vec2, Vec3};

/// Default Kinect-style depth noise curve `sigma(z) = 0.0035 z²` (meters).
pub const DEFAULT_DEPTH_ERROR: Poly2 = Poly2::new(0.0, 0.0, 0.0035);

/// Pinhole intrinsics `fx, fy, cx, cy`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PinholeIntrinsics {
    pub fx: Real,
    pub fy: Real,
    pub cx: Real,
    pub cy: Real,
}

impl PinholeIntrinsics {
    pub fn new(fx: Real, fy: Real, cx: Real, cy: Real) -> Self {
        Self { fx, fy, cx, cy }
    }

    /// The intrinsic matrix `K`.
    pub fn matrix(&self) -> Mat3 {
        Mat3::new(self.fx, 0.0, self.cx, 0.0, self.fy, self.cy, 0.0, 0.0, 1.0)
    }

    /// Project a camera-frame point to pixel coordinates.
    pub fn project(&self, p: &Pt3) -> Vec2 {
        project_pinhole(self.fx, self.fy, self.cx, self.cy, &p.coords)
    }

    /// Back-project a pixel and depth to a camera-frame point.
    pub fn unproject(&self, px: &Vec2, z: Real) -> Pt3 {
        Pt3::new(
            (px.x - self.cx) * z / self.fx,
            (px.y - self.cy) * z / self.fy,
            z,
        )
    }

    /// Intrinsics as the `[fx, fy, cx, cy]` vector mutated by the
    /// depth-intrinsics delta after the distortion-aware optimization.
    pub fn to_array(&self) -> [Real; 4] {
        [self.fx, self.fy, self.cx, self.cy]
    }
}

/// Depth floor keeping the projection defined for points on the image plane.
pub const PROJECTION_EPS: f64 = 1.0e-9;

/// Pinhole projection, generic over the scalar for autodiff residuals.
///
/// Exact away from the image plane; depths below [`PROJECTION_EPS`] in
/// magnitude are nudged so degenerate probe poses stay finite.
pub fn project_pinhole<T: RealField>(fx: T, fy: T, cx: T, cy: T, pc: &Vector3<T>) -> Vector2<T> {
    let eps = T::from_f64(PROJECTION_EPS).unwrap();
    let mut z = pc.z.clone();
    if z.clone().abs() < eps {
        z += eps;
    }
    let x = pc.x.clone() / z.clone();
    let y = pc.y.clone() / z;
    Vector2::new(fx * x + cx, fy * y + cy)
}

/// The color camera of the pair.
///
/// `pose` maps color-frame points into the depth (reference) frame; `None`
/// until the bootstrap stage or the caller provides an estimate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColorSensor {
    pub intrinsics: PinholeIntrinsics,
    pose: Option<Iso3>,
}

impl ColorSensor {
    pub fn new(intrinsics: PinholeIntrinsics) -> Self {
        Self {
            intrinsics,
            pose: None,
        }
    }

    /// Current extrinsic estimate, if any.
    pub fn pose(&self) -> Option<&Iso3> {
        self.pose.as_ref()
    }

    pub fn set_pose(&mut self, pose: Iso3) {
        self.pose = Some(pose);
    }

    /// Project a color-frame point to pixels.
    pub fn project(&self, p: &Pt3) -> Vec2 {
        self.intrinsics.project(p)
    }
}

/// The depth sensor of the pair, fixed at the reference frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepthSensor {
    pub intrinsics: PinholeIntrinsics,
    error_poly: Poly2,
}

impl DepthSensor {
    pub fn new(intrinsics: PinholeIntrinsics) -> Self {
        Self {
            intrinsics,
            error_poly: DEFAULT_DEPTH_ERROR,
        }
    }

    pub fn with_error_poly(intrinsics: PinholeIntrinsics, error_poly: Poly2) -> Self {
        Self {
            intrinsics,
            error_poly,
        }
    }

    /// Expected measurement noise as a function of range.
    pub fn depth_error(&self, z: Real) -> Real {
        self.error_poly.eval(z)
    }

    /// The noise polynomial itself, for residuals evaluated at generic scalars.
    pub fn error_poly(&self) -> &Poly2 {
        &self.error_poly
    }

    /// The sensor pose; the depth frame is the reference of the pair.
    pub fn pose(&self) -> Iso3 {
        Iso3::identity()
    }

    /// Line-of-sight direction through a pixel (unit vector).
    pub fn ray(&self, px: &Vec2) -> Vec3 {
        self.intrinsics.unproject(px, 1.0).coords.normalize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn project_unproject_round_trip() {
        let k = PinholeIntrinsics::new(540.0, 540.0, 320.0, 240.0);
        let p = Pt3::new(0.3, -0.1, 2.5);
        let px = k.project(&p);
        let back = k.unproject(&px, p.z);
        assert_relative_eq!(back, p, epsilon = 1e-12);
    }

    #[test]
    fn projection_stays_finite_on_the_image_plane() {
        let k = PinholeIntrinsics::new(540.0, 540.0, 320.0, 240.0);
        let px = k.project(&Pt3::new(0.1, -0.2, 0.0));
        assert!(px.x.is_finite() && px.y.is_finite());
    }

    #[test]
    fn default_depth_error_grows_quadratically() {
        let s = DepthSensor::new(PinholeIntrinsics::new(570.0, 570.0, 320.0, 240.0));
        assert_relative_eq!(s.depth_error(2.0), 4.0 * s.depth_error(1.0), epsilon = 1e-12);
    }
}
