//! Residual functions for the calibration problems.
//!
//! [`transform`] holds the autodiff factor of the distortion-free optimizer;
//! it is generic over [`nalgebra::RealField`] so tiny-solver can evaluate it
//! with dual numbers. [`reprojection`] and [`distortion`] hold the plain-`f64`
//! residuals of the distortion-aware bundle, which is differentiated by finite
//! differences instead.

pub mod distortion;
pub mod reprojection;
pub mod transform;

pub use distortion::{distortion_residuals, DistortionResidualView};
pub use reprojection::reproj_residuals_pose7;
pub use transform::TransformFactor;
