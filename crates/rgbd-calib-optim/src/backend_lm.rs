//! Dense Levenberg–Marquardt backend over [`NllsProblem`].

use levenberg_marquardt::{LeastSquaresProblem, LevenbergMarquardt};
use nalgebra::{storage::Owned, DMatrix, DVector, Dyn};
use rgbd_calib_core::Real;

use crate::nlls::{NllsProblem, SolveOptions, SolveReport};

struct LmWrapper<'a, P: NllsProblem> {
    problem: &'a P,
    params: DVector<Real>,
}

impl<'a, P: NllsProblem> LeastSquaresProblem<Real, Dyn, Dyn> for LmWrapper<'a, P> {
    type ResidualStorage = Owned<Real, Dyn>;
    type JacobianStorage = Owned<Real, Dyn, Dyn>;
    type ParameterStorage = Owned<Real, Dyn>;

    fn set_params(&mut self, x: &DVector<Real>) {
        self.params.clone_from(x);
    }

    fn params(&self) -> DVector<Real> {
        self.params.clone()
    }

    fn residuals(&self) -> Option<DVector<Real>> {
        Some(self.problem.weighted_residuals(&self.params))
    }

    fn jacobian(&self) -> Option<DMatrix<Real>> {
        Some(self.problem.jacobian(&self.params))
    }
}

/// Backend wrapping the `levenberg-marquardt` crate.
#[derive(Debug, Default, Clone)]
pub struct LmBackend;

impl LmBackend {
    /// Minimize `problem` starting from `x0`.
    ///
    /// The last iterate is returned even when the iteration cap is hit without
    /// convergence; the report's `converged` flag tells the caller which case
    /// occurred.
    pub fn solve<P: NllsProblem>(
        &self,
        problem: &P,
        x0: DVector<Real>,
        opts: &SolveOptions,
    ) -> (DVector<Real>, SolveReport) {
        let lm = LevenbergMarquardt::new()
            .with_ftol(opts.ftol)
            .with_xtol(opts.ftol)
            .with_gtol(opts.gtol)
            .with_patience(opts.max_evals.max(1));

        let wrapper = LmWrapper {
            problem,
            params: x0,
        };

        let (wrapper, report) = lm.minimize(wrapper);
        let x_opt = wrapper.params();

        (
            x_opt,
            SolveReport {
                iterations: report.number_of_evaluations,
                final_cost: report.objective_function,
                converged: report.termination.was_successful(),
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nlls::{NllsProblem, SolveOptions};

    struct Offset;

    impl NllsProblem for Offset {
        fn residuals(&self, x: &DVector<Real>) -> DVector<Real> {
            nalgebra::dvector![x[0] - 3.0, 2.0 * (x[1] + 1.0)]
        }
    }

    #[test]
    fn dense_backend_reaches_the_minimum() {
        let (x, report) = LmBackend.solve(
            &Offset,
            nalgebra::dvector![10.0, 10.0],
            &SolveOptions::default(),
        );
        assert!((x[0] - 3.0).abs() < 1e-8, "x0 = {}", x[0]);
        assert!((x[1] + 1.0).abs() < 1e-8, "x1 = {}", x[1]);
        assert!(report.converged, "report: {report:?}");
        assert!(report.final_cost < 1e-12);
    }
}
