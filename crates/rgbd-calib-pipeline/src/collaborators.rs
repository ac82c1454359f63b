//! Collaborator contracts consumed by the orchestrator.
//!
//! Corner detection, plane extraction, distortion-curve fitting, and the
//! coarse plane-based extrinsic solve all live behind these traits. The
//! pipeline owns the sequencing and the joint optimization; the collaborators
//! own the per-image and per-correspondence algorithms.

use anyhow::Result;
use rgbd_calib_core::{
    CheckerboardView, DepthCloud, Frame, GlobalDistortionModel, Iso3, LocalDistortionModel, Plane,
    PlaneFit, TargetConstraint,
};

/// A geometric primitive observed by one sensor.
#[derive(Debug, Clone)]
pub enum GeometricObservation {
    /// Estimated pose of the target in the sensor frame.
    TargetPose(Iso3),
    /// Plane fitted to the target in the sensor frame.
    Plane(Plane),
}

/// One calibration event seen by both sensors.
#[derive(Debug, Clone)]
pub struct ObservationPair {
    pub color: GeometricObservation,
    pub depth: GeometricObservation,
}

/// Detects checkerboards in frames.
pub trait ViewExtractor {
    /// Extract views of known targets from one frame.
    ///
    /// `color_only` skips the depth-plane fit, leaving `depth_plane` empty.
    /// A constraint filters candidate targets by their estimated pose in the
    /// depth frame.
    fn extract(
        &self,
        frame: &Frame,
        constraint: Option<&dyn TargetConstraint>,
        color_only: bool,
    ) -> Vec<CheckerboardView>;
}

/// Per-correspondence record accumulated by the distortion estimator.
#[derive(Debug, Clone, Default)]
pub struct DepthData {
    /// Plane fitted to the depth region, if extraction succeeded.
    pub plane: Option<PlaneFit>,
    /// Locally undistorted cloud, available once the local model is estimated.
    pub undistorted_cloud: Option<DepthCloud>,
}

impl DepthData {
    pub fn plane_extracted(&self) -> bool {
        self.plane.is_some()
    }
}

/// Fits the local and global depth-distortion models from accumulated
/// (depth cloud, target pose) correspondences.
///
/// Stateful: `add_depth_data` accumulates, then `estimate_local_model`,
/// `estimate_local_model_reverse`, and `estimate_global_model` must be called
/// in that order. `depth_data` records stay index-aligned with the
/// accumulation order.
pub trait DistortionEstimator {
    fn add_depth_data(&mut self, cloud: &DepthCloud, target_pose: &Iso3) -> Result<()>;

    fn estimate_local_model(&mut self) -> Result<()>;

    /// Re-estimate the local model from corrected depths to remove the
    /// residual bias of the first pass.
    fn estimate_local_model_reverse(&mut self) -> Result<()>;

    fn estimate_global_model(&mut self) -> Result<()>;

    /// Accumulated records, one per `add_depth_data` call, in call order.
    fn depth_data(&self) -> &[DepthData];

    fn local_model(&self) -> Option<&LocalDistortionModel>;

    fn global_model(&self) -> Option<&GlobalDistortionModel>;
}

/// Coarse plane-based extrinsic solver.
pub trait CoarseExtrinsicSolver {
    /// Minimum pairs needed for a well-posed solve.
    fn min_pairs(&self) -> usize {
        3
    }

    /// Estimate the color-to-depth transform from paired observations.
    fn estimate_transform(&self, pairs: &[ObservationPair]) -> Result<Iso3>;
}

/// Best-effort sink for poses and views; failures stay inside the publisher.
pub trait CalibrationPublisher {
    fn publish_pose(&self, name: &str, pose: &Iso3);

    fn publish_view(&self, view: &CheckerboardView);
}
