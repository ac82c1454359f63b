//! IRLS row weighting for the dense finite-difference path.
//!
//! The sparse problems use tiny-solver's own loss functions; the dense
//! bundle reweights residual rows itself, so only the weight side of each
//! kernel is carried here.

use rgbd_calib_core::Real;

/// Row weighting applied before the dense linear solve.
#[derive(Debug, Clone, Copy, Default)]
pub enum RobustKernel {
    /// Pure L2 (quadratic).
    #[default]
    None,
    /// Huber loss with threshold `delta`.
    Huber { delta: Real },
    /// Cauchy loss with scale `c`.
    Cauchy { c: Real },
}

impl RobustKernel {
    /// IRLS weight `w(r²)`.
    ///
    /// Residual and Jacobian rows are scaled by `sqrt(w)` before the linear
    /// solve; the weights themselves are never differentiated.
    pub fn weight(self, r2: Real) -> Real {
        match self {
            RobustKernel::None => 1.0,
            RobustKernel::Huber { delta } => {
                let r = r2.sqrt();
                if r <= delta {
                    1.0
                } else {
                    delta / r
                }
            }
            RobustKernel::Cauchy { c } => c * c / (c * c + r2),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn none_is_plain_least_squares() {
        assert_relative_eq!(RobustKernel::None.weight(4.0), 1.0);
    }

    #[test]
    fn huber_is_quadratic_then_linear() {
        let kernel = RobustKernel::Huber { delta: 1.0 };
        assert_relative_eq!(kernel.weight(0.25), 1.0);
        assert_relative_eq!(kernel.weight(25.0), 0.2);
    }

    #[test]
    fn cauchy_downweights_large_residuals() {
        let kernel = RobustKernel::Cauchy { c: 1.0 };
        assert!(kernel.weight(0.01) > 0.9);
        assert!(kernel.weight(100.0) < 0.02);
        assert!(kernel.weight(0.01) > kernel.weight(100.0));
    }
}
