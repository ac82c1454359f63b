//! The calibration run orchestrator.

use anyhow::{anyhow, ensure, Result};
use image::RgbImage;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use std::sync::Mutex;

use rgbd_calib_core::{
    CalibError, CheckerboardDistanceConstraint, CheckerboardView, ColorSensor, DepthCloud,
    DepthSensor, Frame, GlobalDistortionModel, Real,
};
use rgbd_calib_optim::{
    optimize_extrinsics, optimize_full_bundle, BundleView, ExtrinsicsOptions, ExtrinsicsView,
    FullBundleOptions, TinySolveOptions,
};

use crate::collaborators::{
    CalibrationPublisher, CoarseExtrinsicSolver, DistortionEstimator, GeometricObservation,
    ObservationPair, ViewExtractor,
};
use crate::config::CalibrationConfig;

/// Pipeline stages, strictly forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Init,
    BootstrapExtrinsics,
    EstimateDistortion,
    RefineExtrinsics,
    Done,
}

/// Drives one calibration run: ingestion, coarse bootstrap, distortion
/// estimation, joint refinement, publishing.
///
/// Owns every frame and view of the run. Views live in positional slots so
/// they stay index-aligned with the distortion estimator's accumulated
/// records; a view whose depth plane could not be extracted is cleared in
/// place, never removed.
pub struct Calibration {
    config: CalibrationConfig,
    extractor: Box<dyn ViewExtractor>,
    estimator: Box<dyn DistortionEstimator>,
    coarse_solver: Box<dyn CoarseExtrinsicSolver>,
    publisher: Option<Box<dyn CalibrationPublisher>>,
    color: Option<ColorSensor>,
    depth: Option<DepthSensor>,
    depth_intrinsics: Option<[Real; 4]>,
    global_model: Option<GlobalDistortionModel>,
    frames: Vec<Frame>,
    views: Vec<Option<CheckerboardView>>,
    stage: Stage,
    distortion_estimated: bool,
}

impl Calibration {
    pub fn new(
        config: CalibrationConfig,
        extractor: Box<dyn ViewExtractor>,
        estimator: Box<dyn DistortionEstimator>,
        coarse_solver: Box<dyn CoarseExtrinsicSolver>,
    ) -> Self {
        Self {
            config,
            extractor,
            estimator,
            coarse_solver,
            publisher: None,
            color: None,
            depth: None,
            depth_intrinsics: None,
            global_model: None,
            frames: Vec::new(),
            views: Vec::new(),
            stage: Stage::Init,
            distortion_estimated: false,
        }
    }

    pub fn set_publisher(&mut self, publisher: Box<dyn CalibrationPublisher>) {
        self.publisher = Some(publisher);
    }

    pub fn set_color_sensor(&mut self, sensor: ColorSensor) {
        self.color = Some(sensor);
    }

    /// Attach the depth sensor and snapshot its nominal intrinsics; the
    /// snapshot is what the intrinsics delta corrects after refinement.
    pub fn set_depth_sensor(&mut self, sensor: DepthSensor) {
        self.depth_intrinsics = Some(sensor.intrinsics.to_array());
        self.depth = Some(sensor);
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Current color-sensor extrinsic estimate, if any.
    pub fn color_pose(&self) -> Option<rgbd_calib_core::Iso3> {
        self.color.as_ref().and_then(|c| c.pose().copied())
    }

    /// Refined global distortion model, available after the distortion-aware
    /// refinement.
    pub fn global_model(&self) -> Option<&GlobalDistortionModel> {
        self.global_model.as_ref()
    }

    /// `[fx, fy, cx, cy]` of the depth sensor, corrected by the converged
    /// intrinsics delta once the distortion-aware refinement ran.
    pub fn optimized_depth_intrinsics(&self) -> Option<[Real; 4]> {
        self.depth_intrinsics
    }

    pub fn num_frames(&self) -> usize {
        self.frames.len()
    }

    /// Ingested frames, in ingestion order.
    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    /// View slots, index-aligned with the distortion estimator's records.
    pub fn views(&self) -> &[Option<CheckerboardView>] {
        &self.views
    }

    /// Ingest one synchronized image/cloud pair, resampling the cloud by the
    /// configured ratio. Rejects mismatched rasters before any state changes.
    pub fn add_frame(&mut self, image: RgbImage, cloud: DepthCloud) -> Result<usize> {
        if image.width() as usize != cloud.width() || image.height() as usize != cloud.height() {
            return Err(CalibError::CloudSizeMismatch {
                image_w: image.width(),
                image_h: image.height(),
                cloud_w: cloud.width(),
                cloud_h: cloud.height(),
            }
            .into());
        }
        let cloud = cloud.block_average(self.config.downsample_ratio)?;
        let id = self.frames.len() + 1;
        self.frames.push(Frame { id, image, cloud });
        Ok(id)
    }

    /// Inject a detected view directly, bypassing the extractor.
    pub fn add_checkerboard_view(&mut self, view: CheckerboardView) {
        self.views.push(Some(view));
    }

    /// Run the pre-refinement stages: coarse bootstrap when no extrinsic
    /// exists (or re-estimation is requested), then the distortion-estimation
    /// round trip when enabled, otherwise plain view extraction.
    pub fn perform(&mut self) -> Result<()> {
        ensure!(self.stage == Stage::Init, "perform() may only run once");
        let color = self.color.as_ref().ok_or(CalibError::MissingSensor("color"))?;
        self.depth.as_ref().ok_or(CalibError::MissingSensor("depth"))?;

        if self.config.estimate_initial_transform || color.pose().is_none() {
            self.set_stage(Stage::BootstrapExtrinsics);
            self.bootstrap()?;
        }

        if self.config.estimate_depth_model {
            self.set_stage(Stage::EstimateDistortion);
            self.estimate_distortion()?;
            self.reestimate_transform();
        } else {
            for frame in &self.frames {
                for view in self.extractor.extract(frame, None, false) {
                    self.views.push(Some(view));
                }
            }
        }

        self.set_stage(Stage::RefineExtrinsics);
        Ok(())
    }

    /// Joint refinement: distortion-aware when estimation ran, else
    /// distortion-free. Publishes the results and finishes the run.
    pub fn optimize(&mut self) -> Result<()> {
        ensure!(
            self.stage == Stage::RefineExtrinsics,
            "optimize() requires perform() to have completed"
        );
        if self.distortion_estimated {
            self.optimize_all()?;
        } else {
            self.optimize_transform()?;
        }
        self.publish_data();
        self.set_stage(Stage::Done);
        Ok(())
    }

    /// Best-effort publishing of sensor poses and surviving views.
    pub fn publish_data(&self) {
        let Some(publisher) = &self.publisher else {
            return;
        };
        if let Some(depth) = &self.depth {
            publisher.publish_pose("depth", &depth.pose());
        }
        if let Some(pose) = self.color_pose() {
            publisher.publish_pose("color", &pose);
        }
        for view in self.views.iter().flatten() {
            publisher.publish_view(view);
        }
    }

    fn set_stage(&mut self, next: Stage) {
        log::info!("stage {:?} -> {:?}", self.stage, next);
        self.stage = next;
    }

    fn bootstrap(&mut self) -> Result<()> {
        if self.frames.is_empty() {
            return Err(CalibError::InsufficientSamples {
                stage: "bootstrap",
                required: 1,
                got: 0,
            }
            .into());
        }

        let mut rng = StdRng::seed_from_u64(self.config.seed);
        let constraint = CheckerboardDistanceConstraint::new(self.config.max_target_distance);
        let mut collected: Vec<CheckerboardView> = Vec::new();

        // One draw per ingested frame, with replacement.
        for _ in 0..self.frames.len() {
            if collected.len() >= self.config.bootstrap_min_views {
                break;
            }
            let idx = rng.random_range(0..self.frames.len());
            for view in self
                .extractor
                .extract(&self.frames[idx], Some(&constraint), false)
            {
                if view.has_plane() {
                    collected.push(view);
                }
            }
        }
        log::info!(
            "bootstrap collected {} views from {} frames",
            collected.len(),
            self.frames.len()
        );

        let required = self.coarse_solver.min_pairs();
        if collected.len() < required {
            return Err(CalibError::InsufficientSamples {
                stage: "bootstrap",
                required,
                got: collected.len(),
            }
            .into());
        }

        let pairs: Vec<ObservationPair> = collected
            .iter()
            .filter_map(|view| {
                view.depth_plane.as_ref().map(|fit| ObservationPair {
                    color: GeometricObservation::TargetPose(view.color_target_pose),
                    depth: GeometricObservation::Plane(fit.plane),
                })
            })
            .collect();

        let pose = self.coarse_solver.estimate_transform(&pairs)?;
        log::info!("coarse extrinsic estimate: t = {:?}", pose.translation.vector);
        self.color
            .as_mut()
            .ok_or(CalibError::MissingSensor("color"))?
            .set_pose(pose);
        Ok(())
    }

    /// Refresh the coarse extrinsic estimate from every surviving view, so the
    /// joint refinement starts from planes fitted on corrected depth data. The
    /// bootstrap estimate stands when too few views survived.
    fn reestimate_transform(&mut self) {
        let pairs: Vec<ObservationPair> = self
            .views
            .iter()
            .flatten()
            .filter_map(|view| {
                view.depth_plane.as_ref().map(|fit| ObservationPair {
                    color: GeometricObservation::TargetPose(view.color_target_pose),
                    depth: GeometricObservation::Plane(fit.plane),
                })
            })
            .collect();
        if pairs.len() < self.coarse_solver.min_pairs() {
            log::warn!(
                "coarse re-estimation skipped: {} surviving views, {} needed",
                pairs.len(),
                self.coarse_solver.min_pairs()
            );
            return;
        }
        match self.coarse_solver.estimate_transform(&pairs) {
            Ok(pose) => {
                log::info!(
                    "coarse re-estimate over {} views: t = {:?}",
                    pairs.len(),
                    pose.translation.vector
                );
                if let Some(color) = self.color.as_mut() {
                    color.set_pose(pose);
                }
            }
            Err(err) => log::warn!("coarse re-estimation failed: {err}"),
        }
    }

    /// Distortion-estimation round trip: color-only extraction, correspondence
    /// accumulation, local / reverse-local / global fits, then back-filling
    /// plane evidence into the view slots.
    fn estimate_distortion(&mut self) -> Result<()> {
        let color_pose = self
            .color_pose()
            .ok_or_else(|| anyhow!("distortion estimation needs an extrinsic estimate"))?;

        for frame in &self.frames {
            for view in self.extractor.extract(frame, None, true) {
                self.views.push(Some(view));
            }
        }
        ensure!(!self.views.is_empty(), "no checkerboard views extracted");

        for slot in &self.views {
            if let Some(view) = slot {
                let frame = &self.frames[view.frame_id - 1];
                // Target pose in the depth frame, via the current extrinsics.
                let pose_in_depth = color_pose * view.color_target_pose;
                self.estimator.add_depth_data(&frame.cloud, &pose_in_depth)?;
            }
        }

        self.estimator.estimate_local_model()?;
        self.estimator.estimate_local_model_reverse()?;
        self.estimator.estimate_global_model()?;

        let data = self.estimator.depth_data();
        ensure!(
            data.len() == self.views.len(),
            "estimator returned {} records for {} views",
            data.len(),
            self.views.len()
        );
        let mut dropped = 0usize;
        for (slot, record) in self.views.iter_mut().zip(data) {
            match &record.plane {
                Some(fit) => {
                    if let Some(view) = slot {
                        view.set_plane(fit.clone());
                    }
                }
                None => {
                    // Clear the slot, keep the position: index alignment with
                    // the estimator's records must survive.
                    *slot = None;
                    dropped += 1;
                }
            }
        }
        if dropped > 0 {
            log::debug!("cleared {dropped} views without an extracted plane");
        }

        self.distortion_estimated = true;
        Ok(())
    }

    fn optimize_transform(&mut self) -> Result<()> {
        let color = self.color.as_ref().ok_or(CalibError::MissingSensor("color"))?;
        let depth = self.depth.as_ref().ok_or(CalibError::MissingSensor("depth"))?;
        let initial = *color
            .pose()
            .ok_or_else(|| anyhow!("refinement needs an initial extrinsic estimate"))?;

        let views: Vec<ExtrinsicsView> = self
            .views
            .iter()
            .flatten()
            .filter(|v| v.has_plane())
            .map(ExtrinsicsView::from_checkerboard)
            .collect::<Result<_>>()?;
        ensure!(!views.is_empty(), "no views with a fitted depth plane");

        let opts = ExtrinsicsOptions {
            pixel_noise: self.config.pixel_noise,
            error_poly: *depth.error_poly(),
            cauchy_scale: Some(1.0),
            solver: TinySolveOptions {
                max_iters: self.config.extrinsics_max_iters,
                ..TinySolveOptions::default()
            },
        };
        let result = optimize_extrinsics(&views, &initial, &color.intrinsics, &opts)?;
        log::info!(
            "distortion-free refinement over {} views, cost {:.6e}",
            views.len(),
            result.final_cost
        );

        self.color
            .as_mut()
            .ok_or(CalibError::MissingSensor("color"))?
            .set_pose(result.color_pose);
        Ok(())
    }

    fn optimize_all(&mut self) -> Result<()> {
        let color = self.color.as_ref().ok_or(CalibError::MissingSensor("color"))?;
        let depth = self.depth.as_ref().ok_or(CalibError::MissingSensor("depth"))?;
        let initial = *color
            .pose()
            .ok_or_else(|| anyhow!("refinement needs an initial extrinsic estimate"))?;
        let local = self
            .estimator
            .local_model()
            .ok_or_else(|| anyhow!("no local distortion model estimated"))?;
        let global_seed = self
            .estimator
            .global_model()
            .ok_or_else(|| anyhow!("no global distortion model estimated"))?;

        // Slot indices keep each task aligned with the estimator's records.
        let records = self.estimator.depth_data();
        let tasks: Vec<(usize, &CheckerboardView, &rgbd_calib_core::PlaneFit)> = self
            .views
            .iter()
            .enumerate()
            .filter_map(|(slot, v)| {
                let view = v.as_ref()?;
                view.depth_plane.as_ref().map(|fit| (slot, view, fit))
            })
            .collect();
        ensure!(!tasks.is_empty(), "no views with a fitted depth plane");

        // Locally undistorted bundle views, built one task per view and merged
        // under a mutex; slot order restored afterwards. The estimator's
        // corrected cloud is reused when it kept one.
        let frames = &self.frames;
        let collected: Mutex<Vec<(usize, BundleView)>> =
            Mutex::new(Vec::with_capacity(tasks.len()));
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.max_threads)
            .build()?;
        pool.install(|| {
            tasks.par_iter().for_each(|&(slot, view, fit)| {
                let cloud = match records.get(slot).and_then(|r| r.undistorted_cloud.as_ref()) {
                    Some(cloud) => cloud.clone(),
                    None => {
                        let frame = &frames[view.frame_id - 1];
                        local.undistort_cloud(&frame.cloud)
                    }
                };
                let bundle = BundleView {
                    id: format!("{}_undistorted", view.id),
                    corners: view.target.corners(),
                    target_cols: view.target.cols,
                    image_corners: view.color_corners.clone(),
                    target_pose: view.color_target_pose,
                    cloud,
                    inliers: fit.inliers.clone(),
                };
                collected
                    .lock()
                    .expect("view collection lock poisoned")
                    .push((slot, bundle));
            });
        });
        let mut indexed = collected
            .into_inner()
            .expect("view collection lock poisoned");
        indexed.sort_by_key(|(slot, _)| *slot);
        let bundle_views: Vec<BundleView> = indexed.into_iter().map(|(_, v)| v).collect();

        let opts = FullBundleOptions {
            pixel_noise: self.config.pixel_noise,
            solver: rgbd_calib_optim::SolveOptions {
                max_evals: self.config.bundle_max_evals,
                ..rgbd_calib_optim::SolveOptions::default()
            },
        };
        let result = optimize_full_bundle(
            &bundle_views,
            &initial,
            global_seed,
            &color.intrinsics,
            &depth.intrinsics,
            depth.error_poly(),
            &opts,
        )?;
        log::info!(
            "distortion-aware refinement over {} views, cost {:.6e}, delta {:?}",
            bundle_views.len(),
            result.report.final_cost,
            result.depth_delta
        );

        self.global_model = Some(result.global_model);
        if let Some(k) = self.depth_intrinsics.as_mut() {
            result.depth_delta.apply(k);
        }
        self.color
            .as_mut()
            .ok_or(CalibError::MissingSensor("color"))?
            .set_pose(result.color_pose);
        Ok(())
    }
}
