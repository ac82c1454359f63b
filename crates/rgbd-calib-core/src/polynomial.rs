//! Low-order polynomials for depth noise and depth-distortion curves.

use nalgebra::RealField;
use serde::{Deserialize, Serialize};

use crate::Real;

/// A quadratic polynomial `c0 + c1 x + c2 x²`.
///
/// This is the curve shape used both for the depth sensor's range-dependent
/// noise model and for every depth-distortion correction curve (one per local
/// bin, one per global quadrant).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Poly2 {
    /// Coefficients in ascending degree order.
    pub coeffs: [Real; 3],
}

impl Poly2 {
    /// Polynomial from ascending-degree coefficients.
    pub const fn new(c0: Real, c1: Real, c2: Real) -> Self {
        Self {
            coeffs: [c0, c1, c2],
        }
    }

    /// The identity correction curve `p(x) = x`.
    pub const fn identity() -> Self {
        Self::new(0.0, 1.0, 0.0)
    }

    /// Evaluate by Horner's rule.
    pub fn eval(&self, x: Real) -> Real {
        (self.coeffs[2] * x + self.coeffs[1]) * x + self.coeffs[0]
    }

    /// Evaluate generically, for use inside autodiff residuals.
    pub fn eval_generic<T: RealField>(&self, x: T) -> T {
        let c0 = T::from_f64(self.coeffs[0]).unwrap();
        let c1 = T::from_f64(self.coeffs[1]).unwrap();
        let c2 = T::from_f64(self.coeffs[2]).unwrap();
        (c2 * x.clone() + c1) * x + c0
    }
}

impl Default for Poly2 {
    fn default() -> Self {
        Self::identity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn horner_matches_naive_evaluation() {
        let p = Poly2::new(0.5, -1.25, 2.0);
        for &x in &[0.0, 0.7, -1.3, 4.2] {
            assert_relative_eq!(p.eval(x), 0.5 - 1.25 * x + 2.0 * x * x, epsilon = 1e-12);
            assert_relative_eq!(p.eval_generic::<f64>(x), p.eval(x), epsilon = 1e-12);
        }
    }

    #[test]
    fn identity_is_identity() {
        let p = Poly2::identity();
        assert_relative_eq!(p.eval(3.7), 3.7);
    }
}
