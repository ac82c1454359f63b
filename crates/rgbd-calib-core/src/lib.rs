//! Core math and data types for `rgbd-calibration-rs`.
//!
//! This crate contains:
//! - linear algebra type aliases (`Real`, `Vec2`, `Pt3`, ...) and a 3D plane,
//! - low-order polynomials used for depth noise and depth-distortion curves,
//! - an organized depth cloud with block-average resampling,
//! - sensor models for the color camera and the depth sensor,
//! - checkerboard targets, frames, and checkerboard views,
//! - local (per-bin) and global (per-quadrant) depth-distortion models,
//! - synthetic-scene helpers shared by the workspace test suites.

/// Error taxonomy shared across the workspace.
pub mod error;
/// Linear algebra type aliases, planes, and small helpers.
pub mod math;
/// Organized depth clouds and resampling.
pub mod cloud;
/// Local and global depth-distortion models.
pub mod distortion;
/// Low-order polynomials.
pub mod polynomial;
/// Color and depth sensor models.
pub mod sensors;
/// Synthetic scenes for tests.
pub mod synthetic;
/// Planar checkerboard targets.
pub mod target;
/// Frames and checkerboard views.
pub mod view;

pub use cloud::DepthCloud;
pub use distortion::{
    reconcile_quadrants, GlobalDistortionModel, LocalDistortionModel, GLOBAL_POLY_SIZE,
};
pub use error::CalibError;
pub use math::*;
pub use polynomial::Poly2;
pub use sensors::{ColorSensor, DepthSensor, PinholeIntrinsics};
pub use target::{Checkerboard, CheckerboardDistanceConstraint, TargetConstraint};
pub use view::{CheckerboardView, Frame, PlaneFit};
