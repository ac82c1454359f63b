//! Sparse Levenberg-Marquardt front end for the named-block problems.

use anyhow::{anyhow, Result};
use nalgebra::DVector;
use std::collections::HashMap;
use tiny_solver::linear::sparse::LinearSolverType;
use tiny_solver::optimizer::{Optimizer, OptimizerOptions};
use tiny_solver::problem::Problem;
use tiny_solver::LevenbergMarquardtOptimizer;

/// Termination settings for the sparse backend.
///
/// The extrinsics problem always has arrow-shaped sparsity, so the linear
/// solver is fixed to sparse Cholesky and only the termination knobs that
/// matter for calibration are exposed.
#[derive(Debug, Clone, Copy)]
pub struct TinySolveOptions {
    pub max_iters: usize,
    /// Stop once an iteration improves the cost by less than this.
    pub cost_decrease_tol: f64,
}

impl Default for TinySolveOptions {
    fn default() -> Self {
        Self {
            max_iters: 100,
            cost_decrease_tol: 1e-12,
        }
    }
}

/// A solved problem: refined parameter blocks plus the cost at the solution.
pub struct TinySolution {
    pub params: HashMap<String, DVector<f64>>,
    /// `0.5 * ||r||²` evaluated at `params`.
    pub final_cost: f64,
}

/// Run sparse LM on `problem` and evaluate the cost at the solution.
pub fn solve(
    problem: &Problem,
    initial: HashMap<String, DVector<f64>>,
    opts: &TinySolveOptions,
) -> Result<TinySolution> {
    let mut options = OptimizerOptions::default();
    options.max_iteration = opts.max_iters;
    options.linear_solver_type = LinearSolverType::SparseCholesky;
    options.min_abs_error_decrease_threshold = opts.cost_decrease_tol;

    let params = LevenbergMarquardtOptimizer::default()
        .optimize(problem, &initial, Some(options))
        .ok_or_else(|| anyhow!("sparse solve did not converge"))?;

    let blocks = problem.initialize_parameter_blocks(&params);
    let final_cost = 0.5 * problem.compute_residuals(&blocks, true).as_ref().squared_norm_l2();
    Ok(TinySolution { params, final_cost })
}
