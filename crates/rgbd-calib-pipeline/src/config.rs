//! Pipeline configuration.

use rgbd_calib_core::Real;
use serde::{Deserialize, Serialize};

/// Tunables of a calibration run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalibrationConfig {
    /// Block-average ratio applied to every ingested depth cloud (1 = keep).
    pub downsample_ratio: usize,
    /// Run the coarse bootstrap even when an initial extrinsic is already set.
    pub estimate_initial_transform: bool,
    /// Run the distortion-estimation round trip before refinement.
    pub estimate_depth_model: bool,
    /// Upper bound on worker threads for the parallel view construction.
    pub max_threads: usize,
    /// Views the bootstrap collects before calling the coarse solver.
    pub bootstrap_min_views: usize,
    /// Bootstrap validity radius around the depth origin, in meters.
    pub max_target_distance: Real,
    /// Expected corner detection noise in pixels.
    pub pixel_noise: Real,
    /// Seed of the bootstrap's frame sampler.
    pub seed: u64,
    /// Iteration cap of the distortion-free solver.
    pub extrinsics_max_iters: usize,
    /// Residual-evaluation cap of the distortion-aware solver.
    pub bundle_max_evals: usize,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            downsample_ratio: 1,
            estimate_initial_transform: false,
            estimate_depth_model: false,
            max_threads: 8,
            bootstrap_min_views: 10,
            max_target_distance: 2.0,
            pixel_noise: 0.5,
            seed: 0,
            extrinsics_max_iters: 100,
            bundle_max_evals: 300,
        }
    }
}
