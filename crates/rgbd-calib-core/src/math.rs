//! Mathematical type aliases and plane geometry.

use nalgebra::{Isometry3, Matrix3, Point2, Point3, RealField, Unit, Vector2, Vector3};
use serde::{Deserialize, Serialize};

/// Scalar type used throughout the workspace (currently `f64`).
pub type Real = f64;

/// 2D vector with [`Real`] components.
pub type Vec2 = Vector2<Real>;
/// 3D vector with [`Real`] components.
pub type Vec3 = Vector3<Real>;
/// 2D point with [`Real`] coordinates.
pub type Pt2 = Point2<Real>;
/// 3D point with [`Real`] coordinates.
pub type Pt3 = Point3<Real>;
/// 3×3 matrix with [`Real`] entries.
pub type Mat3 = Matrix3<Real>;
/// 3D rigid transform (SE(3)) using [`Real`].
pub type Iso3 = Isometry3<Real>;

/// An oriented plane `n·p + d = 0` with unit normal `n`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Plane {
    /// Unit normal.
    pub normal: Vec3,
    /// Signed offset from the origin.
    pub d: Real,
}

impl Plane {
    /// Plane from a unit normal and offset. The normal is re-normalized.
    pub fn new(normal: Vec3, d: Real) -> Self {
        let n = Unit::new_normalize(normal);
        Self {
            normal: n.into_inner(),
            d,
        }
    }

    /// Plane through three points, oriented by `(b - a) × (c - a)`.
    ///
    /// Returns `None` if the points are (numerically) collinear.
    pub fn through(a: &Pt3, b: &Pt3, c: &Pt3) -> Option<Self> {
        let n = (b - a).cross(&(c - a));
        if n.norm() < 1e-12 {
            return None;
        }
        let n = n.normalize();
        Some(Self {
            normal: n,
            d: -n.dot(&a.coords),
        })
    }

    /// Signed distance from a point to the plane.
    pub fn signed_distance(&self, p: &Pt3) -> Real {
        self.normal.dot(&p.coords) + self.d
    }

    /// Absolute distance from a point to the plane.
    pub fn distance(&self, p: &Pt3) -> Real {
        self.signed_distance(p).abs()
    }

    /// Intersection of the line `t * dir` (through the origin) with the plane.
    ///
    /// Returns `None` when the line is parallel to the plane.
    pub fn intersect_ray(&self, dir: &Vec3) -> Option<Pt3> {
        let denom = self.normal.dot(dir);
        if denom.abs() < 1e-12 {
            return None;
        }
        let t = -self.d / denom;
        Some(Pt3::from(dir * t))
    }

    /// Transform the plane by a rigid transform.
    pub fn transformed(&self, iso: &Iso3) -> Self {
        let n = iso.rotation * self.normal;
        // A point on the plane, moved by the transform.
        let p = iso * Pt3::from(self.normal * (-self.d));
        Self {
            normal: n,
            d: -n.dot(&p.coords),
        }
    }
}

/// Rotate a point by an axis-angle vector, generically over the scalar type.
///
/// The rotation angle is the norm of `aa`; for very small angles the first-order
/// Rodrigues expansion is used to stay differentiable at zero.
pub fn rotate_axis_angle<T: RealField>(aa: &Vector3<T>, p: &Vector3<T>) -> Vector3<T> {
    let theta2 = aa.dot(aa);
    let small = T::from_f64(1e-16).unwrap();
    if theta2 > small {
        let theta = theta2.clone().sqrt();
        let axis = aa / theta.clone();
        let cos = theta.clone().cos();
        let sin = theta.sin();
        let dot = axis.dot(p);
        p * cos.clone() + axis.cross(p) * sin + axis * (dot * (T::one() - cos))
    } else {
        // R ≈ I + [aa]_x near the identity.
        p + aa.cross(p)
    }
}

/// Rotate a point by a quaternion `[w, x, y, z]`, generically over the scalar type.
///
/// The quaternion is normalized internally, so off-manifold inputs behave as
/// their projection onto the unit sphere.
pub fn rotate_quaternion<T: RealField>(q: &[T; 4], p: &Vector3<T>) -> Vector3<T> {
    let norm = (q[0].clone() * q[0].clone()
        + q[1].clone() * q[1].clone()
        + q[2].clone() * q[2].clone()
        + q[3].clone() * q[3].clone())
    .sqrt();
    let w = q[0].clone() / norm.clone();
    let v = Vector3::new(
        q[1].clone() / norm.clone(),
        q[2].clone() / norm.clone(),
        q[3].clone() / norm,
    );
    let uv = v.cross(p);
    let uuv = v.cross(&uv);
    p + (uv * w + uuv) * T::from_f64(2.0).unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::UnitQuaternion;

    #[test]
    fn plane_through_points_has_zero_distance_to_them() {
        let a = Pt3::new(0.0, 0.0, 1.0);
        let b = Pt3::new(1.0, 0.0, 1.0);
        let c = Pt3::new(0.0, 1.0, 1.0);
        let plane = Plane::through(&a, &b, &c).unwrap();
        assert_relative_eq!(plane.distance(&a), 0.0, epsilon = 1e-12);
        assert_relative_eq!(plane.distance(&b), 0.0, epsilon = 1e-12);
        assert_relative_eq!(plane.signed_distance(&Pt3::new(0.0, 0.0, 2.0)), 1.0);
    }

    #[test]
    fn collinear_points_yield_no_plane() {
        let a = Pt3::new(0.0, 0.0, 0.0);
        let b = Pt3::new(1.0, 1.0, 1.0);
        let c = Pt3::new(2.0, 2.0, 2.0);
        assert!(Plane::through(&a, &b, &c).is_none());
    }

    #[test]
    fn ray_intersection_lies_on_plane() {
        let plane = Plane::new(Vec3::new(0.0, 0.0, 1.0), -2.0);
        let p = plane.intersect_ray(&Vec3::new(0.1, -0.2, 1.0)).unwrap();
        assert_relative_eq!(plane.distance(&p), 0.0, epsilon = 1e-12);
        assert_relative_eq!(p.z, 2.0, epsilon = 1e-12);
    }

    #[test]
    fn axis_angle_rotation_matches_nalgebra() {
        let aa = Vec3::new(0.3, -0.2, 0.5);
        let p = Vec3::new(1.0, 2.0, -0.5);
        let expected = UnitQuaternion::from_scaled_axis(aa) * p;
        let got = rotate_axis_angle(&aa, &p);
        assert_relative_eq!(got, expected, epsilon = 1e-12);
    }

    #[test]
    fn quaternion_rotation_matches_nalgebra_even_unnormalized() {
        let uq = UnitQuaternion::from_euler_angles(0.1, -0.4, 0.7);
        let q = uq.into_inner();
        let p = Vec3::new(-0.3, 1.2, 2.0);
        // Scale the quaternion to check the internal normalization.
        let raw = [2.0 * q.w, 2.0 * q.i, 2.0 * q.j, 2.0 * q.k];
        assert_relative_eq!(rotate_quaternion(&raw, &p), uq * p, epsilon = 1e-12);
    }

    #[test]
    fn transformed_plane_tracks_points() {
        let plane = Plane::new(Vec3::new(0.0, 0.0, 1.0), -1.5);
        let iso = Iso3::new(Vec3::new(0.1, 0.2, 0.3), Vec3::new(0.2, 0.1, -0.3));
        let moved = plane.transformed(&iso);
        let p = iso * Pt3::new(0.4, -0.7, 1.5);
        assert_relative_eq!(moved.distance(&p), 0.0, epsilon = 1e-10);
    }
}
