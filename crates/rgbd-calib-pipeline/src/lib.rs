//! RGB-D calibration pipeline.
//!
//! Sequences a calibration run over ingested color/depth frame pairs: optional
//! coarse extrinsic bootstrap, optional depth-distortion estimation through an
//! external estimator, then joint nonlinear refinement of the color-sensor
//! pose (and, when distortion was estimated, the global distortion model and a
//! depth-intrinsics correction). Corner detection, plane extraction, and
//! distortion-curve fitting are collaborator concerns behind the traits in
//! [`collaborators`].

pub mod calibration;
pub mod collaborators;
pub mod config;

pub use calibration::{Calibration, Stage};
pub use collaborators::{
    CalibrationPublisher, CoarseExtrinsicSolver, DepthData, DistortionEstimator,
    GeometricObservation, ObservationPair, ViewExtractor,
};
pub use config::CalibrationConfig;
