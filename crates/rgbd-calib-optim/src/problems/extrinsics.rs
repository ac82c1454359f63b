//! Distortion-free joint extrinsics optimization.
//!
//! Refines the color-to-depth transform together with one target pose per
//! view. Each view contributes a [`TransformFactor`] tying the shared
//! extrinsics block to its own pose block, so the normal equations have the
//! arrow-shaped sparsity a sparse Cholesky solver exploits.

use anyhow::{ensure, Result};
use nalgebra::DVector;
use rgbd_calib_core::{CheckerboardView, Iso3, PinholeIntrinsics, Plane, Poly2, Pt3, Real, Vec2};
use std::collections::HashMap;
use tiny_solver::loss_functions::{CauchyLoss, Loss};
use tiny_solver::problem::Problem;

use crate::factors::TransformFactor;
use crate::params::{iso3_to_pose6, pose6_to_iso3, POSE6_DIM};
use crate::tiny::{self, TinySolveOptions};

/// One view's contribution to the extrinsics problem.
#[derive(Debug, Clone)]
pub struct ExtrinsicsView {
    /// Corner positions in the target frame.
    pub corners: Vec<Pt3>,
    /// Detected corner pixels in the color image, in corner order.
    pub image_corners: Vec<Vec2>,
    /// Initial target pose (target frame into color frame).
    pub target_pose: Iso3,
    /// Plane fitted to the matching depth region, in the depth frame.
    pub plane: Plane,
}

impl ExtrinsicsView {
    /// Build from a checkerboard view carrying a fitted depth plane.
    pub fn from_checkerboard(view: &CheckerboardView) -> Result<Self> {
        let fit = view
            .depth_plane
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("view {} has no fitted depth plane", view.id))?;
        ensure!(
            view.color_corners.len() == view.target.num_corners(),
            "view {}: {} detected corners for a {}-corner target",
            view.id,
            view.color_corners.len(),
            view.target.num_corners()
        );
        Ok(Self {
            corners: view.target.corners(),
            image_corners: view.color_corners.clone(),
            target_pose: view.color_target_pose,
            plane: fit.plane,
        })
    }
}

/// Options for the distortion-free optimizer.
#[derive(Debug, Clone)]
pub struct ExtrinsicsOptions {
    /// Expected corner detection noise in pixels.
    pub pixel_noise: Real,
    /// Depth noise as a function of range.
    pub error_poly: Poly2,
    /// Scale of the Cauchy loss guarding against plane-fit outliers;
    /// `None` solves plain least squares.
    pub cauchy_scale: Option<Real>,
    pub solver: TinySolveOptions,
}

impl Default for ExtrinsicsOptions {
    fn default() -> Self {
        Self {
            pixel_noise: 0.5,
            error_poly: Poly2::new(0.0, 0.0, 0.0035),
            cauchy_scale: Some(1.0),
            solver: TinySolveOptions::default(),
        }
    }
}

/// Output of the distortion-free optimizer.
#[derive(Debug, Clone)]
pub struct ExtrinsicsResult {
    /// Refined color-to-depth transform.
    pub color_pose: Iso3,
    /// Refined per-view target poses (target into color frame), in view order.
    pub target_poses: Vec<Iso3>,
    /// Final cost `0.5 * ||r||²`.
    pub final_cost: Real,
}

/// Jointly refine the color-to-depth transform and all target poses.
pub fn optimize_extrinsics(
    views: &[ExtrinsicsView],
    initial_color_pose: &Iso3,
    intrinsics: &PinholeIntrinsics,
    opts: &ExtrinsicsOptions,
) -> Result<ExtrinsicsResult> {
    ensure!(!views.is_empty(), "need at least one view with a depth plane");

    let mut problem = Problem::new();
    let mut initial: HashMap<String, DVector<Real>> = HashMap::new();
    initial.insert("extr".into(), iso3_to_pose6(initial_color_pose));

    for (i, view) in views.iter().enumerate() {
        ensure!(
            view.corners.len() == view.image_corners.len(),
            "view {}: corner count mismatch ({} vs {})",
            i,
            view.corners.len(),
            view.image_corners.len()
        );
        let name = format!("pose/{i}");
        initial.insert(name.clone(), iso3_to_pose6(&view.target_pose));

        let factor = TransformFactor {
            corners: view.corners.clone(),
            image_corners: view.image_corners.clone(),
            intrinsics: *intrinsics,
            plane: view.plane,
            error_poly: opts.error_poly,
            pixel_noise: opts.pixel_noise,
        };
        let loss = opts
            .cauchy_scale
            .map(|c| Box::new(CauchyLoss::new(c)) as Box<dyn Loss + Send>);
        problem.add_residual_block(
            factor.residual_dim(),
            &["extr", name.as_str()],
            Box::new(factor),
            loss,
        );
    }

    let tiny::TinySolution { params, final_cost } = tiny::solve(&problem, initial, &opts.solver)?;

    let extr = params
        .get("extr")
        .ok_or_else(|| anyhow::anyhow!("solution is missing the extrinsics block"))?;
    debug_assert_eq!(extr.len(), POSE6_DIM);
    let color_pose = pose6_to_iso3(extr.as_view());

    let mut target_poses = Vec::with_capacity(views.len());
    for i in 0..views.len() {
        let block = params
            .get(&format!("pose/{i}"))
            .ok_or_else(|| anyhow::anyhow!("solution is missing pose block {i}"))?;
        target_poses.push(pose6_to_iso3(block.as_view()));
    }

    log::debug!(
        "extrinsics solve: {} views, final cost {:.6e}",
        views.len(),
        final_cost
    );

    Ok(ExtrinsicsResult {
        color_pose,
        target_poses,
        final_cost,
    })
}
