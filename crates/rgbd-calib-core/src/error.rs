//! Error taxonomy for the calibration workspace.
//!
//! Per-item failures (a single view whose depth plane could not be fitted) are
//! represented by absent data, not by errors. The variants here cover the
//! structural failures that abort a stage or the whole run.

use thiserror::Error;

/// Structural calibration failures.
#[derive(Debug, Error)]
pub enum CalibError {
    /// Color image and depth cloud raster dimensions disagree at ingestion.
    #[error("cloud size {cloud_w}x{cloud_h} does not match image size {image_w}x{image_h}")]
    CloudSizeMismatch {
        image_w: u32,
        image_h: u32,
        cloud_w: usize,
        cloud_h: usize,
    },

    /// Point buffer length disagrees with the stated raster dimensions.
    #[error("expected {expected} points for the given raster, got {got}")]
    PointCountMismatch { expected: usize, got: usize },

    /// Downsample ratio must be a positive integer.
    #[error("downsample ratio must be >= 1, got {0}")]
    InvalidDownsampleRatio(usize),

    /// A stage needs more correspondences than were collected.
    #[error("{stage} requires at least {required} samples, got {got}")]
    InsufficientSamples {
        stage: &'static str,
        required: usize,
        got: usize,
    },

    /// A required sensor was not attached before running the pipeline.
    #[error("required sensor not set: {0}")]
    MissingSensor(&'static str),

    /// Target corners were collinear or otherwise unusable for a plane fit.
    #[error("degenerate plane from target corners")]
    DegeneratePlane,
}
