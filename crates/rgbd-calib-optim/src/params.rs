//! Parameter block packing.
//!
//! The distortion-free problem parameterizes poses as 6-vectors
//! `[axis-angle, translation]`; the distortion-aware problem uses 7-vectors
//! `[qw, qx, qy, qz, tx, ty, tz]` whose quaternion part lives on the unit-norm
//! manifold. Both directions of the conversion live here, together with the
//! shared depth-intrinsics delta.

use nalgebra::{DVector, DVectorView, Quaternion, Translation3, UnitQuaternion};
use rgbd_calib_core::{Iso3, Real, Vec3};
use serde::{Deserialize, Serialize};

/// Dimension of an axis-angle pose block.
pub const POSE6_DIM: usize = 6;
/// Dimension of a quaternion pose block.
pub const POSE7_DIM: usize = 7;

/// Pack an `Iso3` into `[ax, ay, az, tx, ty, tz]`.
pub fn iso3_to_pose6(pose: &Iso3) -> DVector<Real> {
    let aa = pose.rotation.scaled_axis();
    let t = pose.translation.vector;
    nalgebra::dvector![aa.x, aa.y, aa.z, t.x, t.y, t.z]
}

/// Unpack `[ax, ay, az, tx, ty, tz]` into an `Iso3`.
pub fn pose6_to_iso3(v: DVectorView<'_, Real>) -> Iso3 {
    debug_assert_eq!(v.len(), POSE6_DIM);
    let rot = UnitQuaternion::from_scaled_axis(Vec3::new(v[0], v[1], v[2]));
    Iso3::from_parts(Translation3::new(v[3], v[4], v[5]), rot)
}

/// Pack an `Iso3` into `[qw, qx, qy, qz, tx, ty, tz]`.
pub fn iso3_to_pose7(pose: &Iso3) -> DVector<Real> {
    let q = pose.rotation.into_inner();
    let t = pose.translation.vector;
    nalgebra::dvector![q.w, q.i, q.j, q.k, t.x, t.y, t.z]
}

/// Unpack `[qw, qx, qy, qz, tx, ty, tz]` into an `Iso3`, normalizing the
/// quaternion (off-manifold inputs project onto the unit sphere).
pub fn pose7_to_iso3(v: DVectorView<'_, Real>) -> Iso3 {
    debug_assert_eq!(v.len(), POSE7_DIM);
    let quat = Quaternion::new(v[0], v[1], v[2], v[3]);
    Iso3::from_parts(
        Translation3::new(v[4], v[5], v[6]),
        UnitQuaternion::from_quaternion(quat),
    )
}

/// Slice variant of [`pose7_to_iso3`] for packed dense parameter vectors.
pub fn pose7_slice_to_iso3(v: &[Real]) -> Iso3 {
    debug_assert_eq!(v.len(), POSE7_DIM);
    let quat = Quaternion::new(v[0], v[1], v[2], v[3]);
    Iso3::from_parts(
        Translation3::new(v[4], v[5], v[6]),
        UnitQuaternion::from_quaternion(quat),
    )
}

/// Normalize the quaternion part of a packed 7-vector in place.
pub fn renormalize_pose7(v: &mut [Real]) {
    debug_assert!(v.len() >= 4);
    let norm = (v[0] * v[0] + v[1] * v[1] + v[2] * v[2] + v[3] * v[3]).sqrt();
    if norm > 0.0 {
        for q in v.iter_mut().take(4) {
            *q /= norm;
        }
    }
}

/// Shared correction to the depth sensor's nominal intrinsics.
///
/// Focal lengths are scaled by `(sx, sy)`, the principal point shifted by
/// `(dx, dy)`. The identity correction is `[1, 1, 0, 0]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IntrinsicsDelta {
    pub sx: Real,
    pub sy: Real,
    pub dx: Real,
    pub dy: Real,
}

impl IntrinsicsDelta {
    pub const DIM: usize = 4;

    pub fn identity() -> Self {
        Self {
            sx: 1.0,
            sy: 1.0,
            dx: 0.0,
            dy: 0.0,
        }
    }

    pub fn from_slice(v: &[Real]) -> Self {
        debug_assert_eq!(v.len(), Self::DIM);
        Self {
            sx: v[0],
            sy: v[1],
            dx: v[2],
            dy: v[3],
        }
    }

    pub fn to_array(self) -> [Real; 4] {
        [self.sx, self.sy, self.dx, self.dy]
    }

    /// Apply to `[fx, fy, cx, cy]`: multiplicative on focal lengths, additive
    /// on the principal point.
    pub fn apply(self, intrinsics: &mut [Real; 4]) {
        intrinsics[0] *= self.sx;
        intrinsics[1] *= self.sy;
        intrinsics[2] += self.dx;
        intrinsics[3] += self.dy;
    }
}

impl Default for IntrinsicsDelta {
    fn default() -> Self {
        Self::identity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rgbd_calib_core::synthetic::pose;

    #[test]
    fn pose6_round_trip() {
        let iso = pose(0.2, -0.4, 0.1, 0.3, -0.6, 1.2);
        let v = iso3_to_pose6(&iso);
        let back = pose6_to_iso3(v.as_view());
        assert_relative_eq!(back.to_homogeneous(), iso.to_homogeneous(), epsilon = 1e-12);
    }

    #[test]
    fn pose7_round_trip_normalizes() {
        let iso = pose(0.5, 0.1, -0.3, -0.2, 0.8, 2.0);
        let mut v = iso3_to_pose7(&iso);
        // Perturb off the manifold; unpacking must project back.
        v[0] *= 1.5;
        v[1] *= 1.5;
        v[2] *= 1.5;
        v[3] *= 1.5;
        let back = pose7_to_iso3(v.as_view());
        assert_relative_eq!(back.to_homogeneous(), iso.to_homogeneous(), epsilon = 1e-12);
    }

    #[test]
    fn identity_delta_is_a_no_op() {
        let mut k = [570.0, 571.0, 314.5, 235.5];
        IntrinsicsDelta::identity().apply(&mut k);
        assert_eq!(k, [570.0, 571.0, 314.5, 235.5]);
    }

    #[test]
    fn delta_scales_and_shifts() {
        let mut k = [500.0, 400.0, 320.0, 240.0];
        IntrinsicsDelta {
            sx: 1.1,
            sy: 0.9,
            dx: 2.0,
            dy: -3.0,
        }
        .apply(&mut k);
        assert_relative_eq!(k[0], 550.0);
        assert_relative_eq!(k[1], 360.0);
        assert_relative_eq!(k[2], 322.0);
        assert_relative_eq!(k[3], 237.0);
    }
}
