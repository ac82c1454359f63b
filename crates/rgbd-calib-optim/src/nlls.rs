//! Dense nonlinear least-squares seam with a finite-difference Jacobian.
//!
//! The distortion-aware bundle cannot use autodiff: every residual evaluation
//! embeds a closed-form solve reconciling the global distortion quadrants, so
//! derivatives are probed numerically. Implementors provide `residuals`; the
//! default `jacobian` applies central differences to the robustly weighted
//! residual vector.

use nalgebra::{DMatrix, DVector};
use rgbd_calib_core::Real;

use crate::robust::RobustKernel;

/// Generic dense NLLS problem.
pub trait NllsProblem {
    /// Unweighted residual vector at `x`.
    fn residuals(&self, x: &DVector<Real>) -> DVector<Real>;

    /// Robust kernel applied per residual row.
    fn kernel(&self) -> RobustKernel {
        RobustKernel::None
    }

    /// Residuals scaled by `sqrt(w_i)` from the robust kernel.
    fn weighted_residuals(&self, x: &DVector<Real>) -> DVector<Real> {
        let mut r = self.residuals(x);
        match self.kernel() {
            RobustKernel::None => r,
            kernel => {
                for ri in r.iter_mut() {
                    *ri *= kernel.weight(*ri * *ri).sqrt();
                }
                r
            }
        }
    }

    /// Central finite-difference Jacobian of the weighted residuals.
    ///
    /// The step is scaled to each parameter's magnitude. Two residual
    /// evaluations per parameter; implementors with sparse structure may
    /// override this with a hand-assembled Jacobian.
    fn jacobian(&self, x: &DVector<Real>) -> DMatrix<Real> {
        let base = self.weighted_residuals(x);
        let m = base.len();
        let n = x.len();
        let mut jac = DMatrix::zeros(m, n);
        let mut probe = x.clone();
        // eps^(1/3) is the usual central-difference sweet spot.
        let h0 = Real::EPSILON.cbrt();
        for col in 0..n {
            let h = h0 * x[col].abs().max(1.0);
            probe[col] = x[col] + h;
            let plus = self.weighted_residuals(&probe);
            probe[col] = x[col] - h;
            let minus = self.weighted_residuals(&probe);
            probe[col] = x[col];
            let scale = 0.5 / h;
            for row in 0..m {
                jac[(row, col)] = (plus[row] - minus[row]) * scale;
            }
        }
        jac
    }
}

/// Options for the dense backend.
///
/// `max_evals` caps residual evaluations, not LM iterations; the
/// finite-difference Jacobian spends two evaluations per parameter, so the
/// cap has to leave room for several full Jacobian rebuilds.
#[derive(Debug, Clone)]
pub struct SolveOptions {
    pub max_evals: usize,
    pub ftol: Real,
    pub gtol: Real,
}

impl Default for SolveOptions {
    fn default() -> Self {
        Self {
            max_evals: 300,
            ftol: 1e-14,
            gtol: 1e-14,
        }
    }
}

/// Summary of a dense solve.
#[derive(Debug, Clone)]
pub struct SolveReport {
    pub iterations: usize,
    pub final_cost: Real,
    pub converged: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    struct Quadratic;

    impl NllsProblem for Quadratic {
        fn residuals(&self, x: &DVector<Real>) -> DVector<Real> {
            nalgebra::dvector![x[0] * x[0] - 2.0, x[0] * x[1]]
        }
    }

    #[test]
    fn central_differences_match_analytic_jacobian() {
        let problem = Quadratic;
        let x = nalgebra::dvector![1.5, -0.7];
        let jac = problem.jacobian(&x);
        assert_relative_eq!(jac[(0, 0)], 2.0 * x[0], epsilon = 1e-7);
        assert_relative_eq!(jac[(0, 1)], 0.0, epsilon = 1e-7);
        assert_relative_eq!(jac[(1, 0)], x[1], epsilon = 1e-7);
        assert_relative_eq!(jac[(1, 1)], x[0], epsilon = 1e-7);
    }

    struct Weighted;

    impl NllsProblem for Weighted {
        fn residuals(&self, x: &DVector<Real>) -> DVector<Real> {
            nalgebra::dvector![x[0] - 1.0, 100.0]
        }

        fn kernel(&self) -> RobustKernel {
            RobustKernel::Cauchy { c: 1.0 }
        }
    }

    #[test]
    fn weighted_residuals_shrink_outlier_rows() {
        let problem = Weighted;
        let r = problem.weighted_residuals(&nalgebra::dvector![1.0]);
        assert_relative_eq!(r[0], 0.0);
        assert!(r[1].abs() < 100.0 * 0.05);
    }
}
