//! Depth-distortion models.
//!
//! Two parameterizations of the systematic depth-measurement error, both
//! mapping measured depth to corrected depth and both applied along each
//! point's line of sight:
//!
//! - [`LocalDistortionModel`]: one quadratic per discretized pixel bin,
//!   capturing high-frequency spatial distortion;
//! - [`GlobalDistortionModel`]: one quadratic per coarse image quadrant. Three
//!   quadrant curves are free; the fourth is recovered from them by a small
//!   closed-form solve ([`reconcile_quadrants`]), which couples the quadrants
//!   and must be recomputed whenever the free curves change.
//!
//! Fitting the curves from correspondences is an external collaborator's
//! concern; this module owns the parameterization and its application.

use nalgebra::{Matrix3, Vector3};
use serde::{Deserialize, Serialize};

use crate::{DepthCloud, Poly2, Pt3, Real};

/// Coefficient count of a global quadrant polynomial.
pub const GLOBAL_POLY_SIZE: usize = 3;

/// Per-pixel-bin depth correction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalDistortionModel {
    bin_w: usize,
    bin_h: usize,
    bins_x: usize,
    bins_y: usize,
    polys: Vec<Poly2>,
}

impl LocalDistortionModel {
    /// Identity model covering a `width × height` raster with bins of
    /// `bin_w × bin_h` pixels.
    pub fn identity(width: usize, height: usize, bin_w: usize, bin_h: usize) -> Self {
        let bins_x = width.div_ceil(bin_w);
        let bins_y = height.div_ceil(bin_h);
        Self {
            bin_w,
            bin_h,
            bins_x,
            bins_y,
            polys: vec![Poly2::identity(); bins_x * bins_y],
        }
    }

    pub fn bins(&self) -> (usize, usize) {
        (self.bins_x, self.bins_y)
    }

    /// Correction curve for a raster position.
    pub fn poly_at_pixel(&self, col: usize, row: usize) -> &Poly2 {
        let bx = (col / self.bin_w).min(self.bins_x - 1);
        let by = (row / self.bin_h).min(self.bins_y - 1);
        &self.polys[by * self.bins_x + bx]
    }

    /// Replace the curve of one bin (used by the external estimator).
    pub fn set_poly(&mut self, bx: usize, by: usize, poly: Poly2) {
        self.polys[by * self.bins_x + bx] = poly;
    }

    /// Apply the correction to every finite cloud point along its line of sight.
    pub fn undistort_cloud(&self, cloud: &DepthCloud) -> DepthCloud {
        cloud.map_points(|col, row, p| {
            scale_along_ray(p, self.poly_at_pixel(col, row))
        })
    }
}

/// Whole-image quadrant depth correction.
///
/// Quadrants are addressed as `(qx, qy)` with `(1, 1)` always holding the
/// reconciled curve derived from the other three.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalDistortionModel {
    width: usize,
    height: usize,
    quadrants: [Poly2; 4],
}

impl GlobalDistortionModel {
    /// Identity model for a `width × height` raster.
    pub fn identity(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            quadrants: [Poly2::identity(); 4],
        }
    }

    /// Raster dimensions the model was estimated for.
    pub fn image_size(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    pub fn quadrant(&self, qx: usize, qy: usize) -> &Poly2 {
        &self.quadrants[qx * 2 + qy]
    }

    pub fn set_quadrant(&mut self, qx: usize, qy: usize, poly: Poly2) {
        self.quadrants[qx * 2 + qy] = poly;
    }

    /// The nine free coefficients, quadrants `(0,0)`, `(0,1)`, `(1,0)` in order.
    pub fn free_coeffs(&self) -> [Real; 3 * GLOBAL_POLY_SIZE] {
        let mut out = [0.0; 3 * GLOBAL_POLY_SIZE];
        for (qi, q) in self.quadrants[..3].iter().enumerate() {
            out[qi * GLOBAL_POLY_SIZE..(qi + 1) * GLOBAL_POLY_SIZE].copy_from_slice(&q.coeffs);
        }
        out
    }

    /// Install nine free coefficients and recompute the reconciled quadrant.
    pub fn set_free_coeffs(&mut self, coeffs: &[Real]) {
        debug_assert_eq!(coeffs.len(), 3 * GLOBAL_POLY_SIZE);
        for qi in 0..3 {
            self.quadrants[qi].coeffs
                .copy_from_slice(&coeffs[qi * GLOBAL_POLY_SIZE..(qi + 1) * GLOBAL_POLY_SIZE]);
        }
        self.reconcile();
    }

    /// Recompute quadrant `(1,1)` from the three free quadrants.
    pub fn reconcile(&mut self) {
        self.quadrants[3] =
            reconcile_quadrants(&self.quadrants[0], &self.quadrants[1], &self.quadrants[2]);
    }

    /// Correction curve for a raster position.
    pub fn poly_at_pixel(&self, col: usize, row: usize) -> &Poly2 {
        let qx = usize::from(col >= self.width / 2);
        let qy = usize::from(row >= self.height / 2);
        self.quadrant(qx, qy)
    }

    /// Apply the correction to every finite cloud point along its line of sight.
    pub fn undistort_cloud(&self, cloud: &DepthCloud) -> DepthCloud {
        cloud.map_points(|col, row, p| scale_along_ray(p, self.poly_at_pixel(col, row)))
    }

    /// Apply the correction to a single point observed at `(col, row)`.
    pub fn undistort_point(&self, col: usize, row: usize, p: &Pt3) -> Pt3 {
        scale_along_ray(p, self.poly_at_pixel(col, row))
    }
}

/// Recover the fourth quadrant curve from the three free ones.
///
/// The curves are tied by `p4(x) = p2(x) + p3(x) - p1(x)` at
/// [`GLOBAL_POLY_SIZE`] sample abscissae `x = 1, 2, 3`; the coefficients solving
/// that Vandermonde system are returned. Pure and allocation-free: it runs once
/// per residual evaluation under finite-difference probing.
pub fn reconcile_quadrants(p1: &Poly2, p2: &Poly2, p3: &Poly2) -> Poly2 {
    let mut a = Matrix3::<Real>::zeros();
    let mut b = Vector3::<Real>::zeros();
    for i in 0..GLOBAL_POLY_SIZE {
        let x = (i + 1) as Real;
        b[i] = p2.eval(x) + p3.eval(x) - p1.eval(x);
        let mut pow = 1.0;
        for j in 0..GLOBAL_POLY_SIZE {
            a[(i, j)] = pow;
            pow *= x;
        }
    }
    // The Vandermonde system with distinct abscissae is always invertible.
    let x = a.lu().solve(&b).unwrap_or_else(|| Vector3::new(0.0, 1.0, 0.0));
    Poly2::new(x[0], x[1], x[2])
}

/// Scale a point along its line of sight so its depth becomes `poly(z)`.
fn scale_along_ray(p: &Pt3, poly: &Poly2) -> Pt3 {
    let z = p.z;
    if z.abs() < 1e-12 {
        return *p;
    }
    Pt3::from(p.coords * (poly.eval(z) / z))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn reconcile_recovers_exact_polynomial_combination() {
        let p1 = Poly2::new(0.1, 0.9, 0.01);
        let p2 = Poly2::new(-0.05, 1.1, -0.02);
        let p3 = Poly2::new(0.2, 0.95, 0.03);
        let p4 = reconcile_quadrants(&p1, &p2, &p3);
        for &x in &[0.5, 1.0, 2.7, 4.0] {
            assert_relative_eq!(
                p4.eval(x),
                p2.eval(x) + p3.eval(x) - p1.eval(x),
                epsilon = 1e-9
            );
        }
    }

    #[test]
    fn identity_quadrants_reconcile_to_identity() {
        let mut model = GlobalDistortionModel::identity(640, 480);
        model.reconcile();
        let q = model.quadrant(1, 1);
        assert_relative_eq!(q.eval(2.0), 2.0, epsilon = 1e-12);
    }

    #[test]
    fn undistort_scales_along_line_of_sight() {
        let mut model = GlobalDistortionModel::identity(4, 4);
        // Uniform 10% depth inflation in every free quadrant.
        let inflate = Poly2::new(0.0, 1.1, 0.0);
        model.set_free_coeffs(&[
            inflate.coeffs[0], inflate.coeffs[1], inflate.coeffs[2],
            inflate.coeffs[0], inflate.coeffs[1], inflate.coeffs[2],
            inflate.coeffs[0], inflate.coeffs[1], inflate.coeffs[2],
        ]);
        let p = Pt3::new(0.2, -0.1, 2.0);
        let q = model.undistort_point(3, 3, &p);
        assert_relative_eq!(q.coords, p.coords * 1.1, epsilon = 1e-9);
        // Direction is preserved.
        assert_relative_eq!(
            q.coords.normalize(),
            p.coords.normalize(),
            epsilon = 1e-12
        );
    }

    #[test]
    fn local_model_bins_cover_the_raster() {
        let mut model = LocalDistortionModel::identity(8, 6, 4, 4);
        assert_eq!(model.bins(), (2, 2));
        model.set_poly(1, 1, Poly2::new(0.0, 2.0, 0.0));
        assert_relative_eq!(model.poly_at_pixel(7, 5).eval(1.0), 2.0);
        assert_relative_eq!(model.poly_at_pixel(0, 0).eval(1.0), 1.0);
    }
}
