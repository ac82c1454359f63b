//! Problem builders for the two joint calibration stages.

pub mod extrinsics;
pub mod full_bundle;

pub use extrinsics::{optimize_extrinsics, ExtrinsicsOptions, ExtrinsicsResult, ExtrinsicsView};
pub use full_bundle::{
    optimize_full_bundle, BundleView, FullBundleOptions, FullBundleProblem, FullBundleResult,
};
