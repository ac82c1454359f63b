//! Joint nonlinear optimization for RGB-D calibration.
//!
//! Two problem formulations refine the color-sensor extrinsics from
//! checkerboard views:
//!
//! - [`problems::extrinsics`]: the distortion-free joint optimizer. Built on
//!   tiny-solver with autodiff residuals, a Cauchy loss, and a sparse linear
//!   solver exploiting the one-shared-block / many-view-blocks structure.
//! - [`problems::full_bundle`]: the distortion-aware joint optimizer. A dense
//!   nonlinear least-squares problem solved with `levenberg-marquardt` and a
//!   central finite-difference Jacobian, because each residual evaluation
//!   embeds a closed-form solve reconciling the global distortion quadrants.

pub mod backend_lm;
pub mod factors;
pub mod nlls;
pub mod params;
pub mod problems;
pub mod robust;
pub mod tiny;

pub use backend_lm::LmBackend;
pub use nlls::{NllsProblem, SolveOptions, SolveReport};
pub use params::{
    iso3_to_pose6, iso3_to_pose7, pose6_to_iso3, pose7_slice_to_iso3, pose7_to_iso3,
    IntrinsicsDelta, POSE6_DIM, POSE7_DIM,
};
pub use problems::extrinsics::{
    optimize_extrinsics, ExtrinsicsOptions, ExtrinsicsResult, ExtrinsicsView,
};
pub use problems::full_bundle::{
    optimize_full_bundle, BundleView, FullBundleOptions, FullBundleProblem, FullBundleResult,
};
pub use robust::RobustKernel;
pub use tiny::{TinySolution, TinySolveOptions};
