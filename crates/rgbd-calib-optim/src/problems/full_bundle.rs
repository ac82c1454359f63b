//! Distortion-aware joint optimization.
//!
//! Refines the color-to-depth transform, the global distortion quadrants, the
//! shared depth-intrinsics delta, and one target pose per view, all in a
//! single dense parameter vector:
//!
//! ```text
//! [ color_pose7 | 9 quadrant coeffs | delta4 | view pose7, view pose7, ... ]
//! ```
//!
//! Quaternions are stored unconstrained; residual evaluation normalizes them
//! on unpacking and the solution is renormalized after the solve. The fourth
//! distortion quadrant is never a parameter: it is reconciled from the free
//! three inside every residual evaluation, which is also why this problem is
//! differentiated numerically rather than with autodiff.

use anyhow::{ensure, Result};
use nalgebra::DVector;
use rgbd_calib_core::{
    DepthCloud, GlobalDistortionModel, Iso3, PinholeIntrinsics, Poly2, Pt3, Real, Vec2,
    GLOBAL_POLY_SIZE,
};

use crate::backend_lm::LmBackend;
use crate::factors::{distortion_residuals, reproj_residuals_pose7, DistortionResidualView};
use crate::nlls::{NllsProblem, SolveOptions, SolveReport};
use crate::params::{
    iso3_to_pose7, pose7_slice_to_iso3, renormalize_pose7, IntrinsicsDelta, POSE7_DIM,
};

const COLOR_OFFSET: usize = 0;
const GLOBAL_OFFSET: usize = COLOR_OFFSET + POSE7_DIM;
const DELTA_OFFSET: usize = GLOBAL_OFFSET + 3 * GLOBAL_POLY_SIZE;
const VIEWS_OFFSET: usize = DELTA_OFFSET + IntrinsicsDelta::DIM;

/// One view's contribution to the distortion-aware bundle.
#[derive(Debug, Clone)]
pub struct BundleView {
    /// View identifier; callers building from corrected clouds suffix the
    /// source view's id with `_undistorted`.
    pub id: String,
    /// Corner positions in the target frame.
    pub corners: Vec<Pt3>,
    /// Inner-corner count along X.
    pub target_cols: usize,
    /// Detected corner pixels in the color image, in corner order.
    pub image_corners: Vec<Vec2>,
    /// Initial target pose (target frame into color frame).
    pub target_pose: Iso3,
    /// Locally undistorted depth cloud of the view.
    pub cloud: DepthCloud,
    /// Flat raster indices of the measured plane inliers.
    pub inliers: Vec<usize>,
}

impl BundleView {
    fn residual_dim(&self) -> usize {
        3 * self.inliers.len() + 2 * self.corners.len()
    }
}

/// Options for the distortion-aware optimizer.
#[derive(Debug, Clone)]
pub struct FullBundleOptions {
    /// Expected corner detection noise in pixels.
    pub pixel_noise: Real,
    pub solver: SolveOptions,
}

impl Default for FullBundleOptions {
    fn default() -> Self {
        Self {
            pixel_noise: 0.5,
            solver: SolveOptions::default(),
        }
    }
}

/// Output of the distortion-aware optimizer.
#[derive(Debug, Clone)]
pub struct FullBundleResult {
    /// Refined color-to-depth transform.
    pub color_pose: Iso3,
    /// Refined global distortion model, fourth quadrant reconciled.
    pub global_model: GlobalDistortionModel,
    /// Refined depth-intrinsics correction.
    pub depth_delta: IntrinsicsDelta,
    /// Refined per-view target poses (target into color frame), in view order.
    pub target_poses: Vec<Iso3>,
    pub report: SolveReport,
}

/// Dense residual assembly over all bundle views.
pub struct FullBundleProblem<'a> {
    views: &'a [BundleView],
    color_intrinsics: PinholeIntrinsics,
    depth_intrinsics: PinholeIntrinsics,
    error_poly: Poly2,
    pixel_noise: Real,
}

impl<'a> FullBundleProblem<'a> {
    pub fn new(
        views: &'a [BundleView],
        color_intrinsics: PinholeIntrinsics,
        depth_intrinsics: PinholeIntrinsics,
        error_poly: Poly2,
        pixel_noise: Real,
    ) -> Self {
        Self {
            views,
            color_intrinsics,
            depth_intrinsics,
            error_poly,
            pixel_noise,
        }
    }

    /// Total parameter dimension.
    pub fn num_params(&self) -> usize {
        VIEWS_OFFSET + POSE7_DIM * self.views.len()
    }

    /// Total residual dimension.
    pub fn num_residuals(&self) -> usize {
        self.views.iter().map(BundleView::residual_dim).sum()
    }

    /// Pack the initial parameter vector, seeding the quadrant coefficients
    /// from a previously fitted global model.
    pub fn initial_params(
        &self,
        color_pose: &Iso3,
        global: &GlobalDistortionModel,
    ) -> DVector<Real> {
        let mut x = DVector::zeros(self.num_params());
        x.rows_mut(COLOR_OFFSET, POSE7_DIM)
            .copy_from(&iso3_to_pose7(color_pose));
        x.rows_mut(GLOBAL_OFFSET, 3 * GLOBAL_POLY_SIZE)
            .copy_from_slice(&global.free_coeffs());
        x.rows_mut(DELTA_OFFSET, IntrinsicsDelta::DIM)
            .copy_from_slice(&IntrinsicsDelta::identity().to_array());
        for (i, view) in self.views.iter().enumerate() {
            x.rows_mut(VIEWS_OFFSET + POSE7_DIM * i, POSE7_DIM)
                .copy_from(&iso3_to_pose7(&view.target_pose));
        }
        x
    }
}

impl NllsProblem for FullBundleProblem<'_> {
    fn residuals(&self, x: &DVector<Real>) -> DVector<Real> {
        let p = x.as_slice();
        let color_pose7 = &p[COLOR_OFFSET..COLOR_OFFSET + POSE7_DIM];
        let global_coeffs = &p[GLOBAL_OFFSET..GLOBAL_OFFSET + 3 * GLOBAL_POLY_SIZE];
        let delta = &p[DELTA_OFFSET..DELTA_OFFSET + IntrinsicsDelta::DIM];

        let mut out = DVector::zeros(self.num_residuals());
        let mut row = 0;
        for (i, view) in self.views.iter().enumerate() {
            let start = VIEWS_OFFSET + POSE7_DIM * i;
            let target_pose7 = &p[start..start + POSE7_DIM];

            let depth_dim = 3 * view.inliers.len();
            distortion_residuals(
                &DistortionResidualView {
                    corners: &view.corners,
                    target_cols: view.target_cols,
                    cloud: &view.cloud,
                    inliers: &view.inliers,
                },
                color_pose7,
                target_pose7,
                global_coeffs,
                delta,
                &self.depth_intrinsics,
                &self.error_poly,
                &mut out.as_mut_slice()[row..row + depth_dim],
            );
            row += depth_dim;

            let reproj_dim = 2 * view.corners.len();
            reproj_residuals_pose7(
                &self.color_intrinsics,
                &view.corners,
                &view.image_corners,
                target_pose7,
                self.pixel_noise,
                &mut out.as_mut_slice()[row..row + reproj_dim],
            );
            row += reproj_dim;
        }
        debug_assert_eq!(row, out.len());
        out
    }
}

/// Jointly refine extrinsics, global distortion, depth-intrinsics delta, and
/// target poses.
///
/// `initial_global` seeds the quadrant coefficient block, so a model fitted
/// beforehand is refined rather than re-derived from identity.
#[allow(clippy::too_many_arguments)]
pub fn optimize_full_bundle(
    views: &[BundleView],
    initial_color_pose: &Iso3,
    initial_global: &GlobalDistortionModel,
    color_intrinsics: &PinholeIntrinsics,
    depth_intrinsics: &PinholeIntrinsics,
    error_poly: &Poly2,
    opts: &FullBundleOptions,
) -> Result<FullBundleResult> {
    ensure!(!views.is_empty(), "need at least one view with plane inliers");
    let (width, height) = (views[0].cloud.width(), views[0].cloud.height());
    for view in views {
        ensure!(
            view.corners.len() == view.image_corners.len(),
            "view {}: corner count mismatch ({} vs {})",
            view.id,
            view.corners.len(),
            view.image_corners.len()
        );
        // Two corner rows are needed to span the target plane.
        ensure!(
            view.target_cols >= 2 && view.corners.len() > view.target_cols,
            "view {}: a {}-corner target with {} columns cannot span a plane",
            view.id,
            view.corners.len(),
            view.target_cols
        );
        ensure!(
            view.cloud.width() == width && view.cloud.height() == height,
            "view {}: cloud size {}x{} differs from {}x{}",
            view.id,
            view.cloud.width(),
            view.cloud.height(),
            width,
            height
        );
        ensure!(!view.inliers.is_empty(), "view {} has no plane inliers", view.id);
    }

    let problem = FullBundleProblem::new(
        views,
        *color_intrinsics,
        *depth_intrinsics,
        *error_poly,
        opts.pixel_noise,
    );
    ensure!(
        problem.num_residuals() >= problem.num_params(),
        "underdetermined bundle: {} residuals for {} parameters",
        problem.num_residuals(),
        problem.num_params()
    );

    let x0 = problem.initial_params(initial_color_pose, initial_global);
    let (mut x, report) = LmBackend.solve(&problem, x0, &opts.solver);
    if !report.converged {
        log::warn!(
            "distortion-aware bundle stopped without convergence after {} evaluations (cost {:.6e})",
            report.iterations,
            report.final_cost
        );
    }

    // Project quaternion blocks back onto the unit sphere.
    let p = x.as_mut_slice();
    renormalize_pose7(&mut p[COLOR_OFFSET..COLOR_OFFSET + POSE7_DIM]);
    for i in 0..views.len() {
        let start = VIEWS_OFFSET + POSE7_DIM * i;
        renormalize_pose7(&mut p[start..start + POSE7_DIM]);
    }

    let color_pose = pose7_slice_to_iso3(&p[COLOR_OFFSET..COLOR_OFFSET + POSE7_DIM]);
    let mut global_model = GlobalDistortionModel::identity(width, height);
    global_model.set_free_coeffs(&p[GLOBAL_OFFSET..GLOBAL_OFFSET + 3 * GLOBAL_POLY_SIZE]);
    let depth_delta =
        IntrinsicsDelta::from_slice(&p[DELTA_OFFSET..DELTA_OFFSET + IntrinsicsDelta::DIM]);
    let target_poses = (0..views.len())
        .map(|i| {
            let start = VIEWS_OFFSET + POSE7_DIM * i;
            pose7_slice_to_iso3(&p[start..start + POSE7_DIM])
        })
        .collect();

    log::debug!(
        "full bundle: {} views, {} residuals, final cost {:.6e}",
        views.len(),
        problem.num_residuals(),
        report.final_cost
    );

    Ok(FullBundleResult {
        color_pose,
        global_model,
        depth_delta,
        target_poses,
        report,
    })
}
