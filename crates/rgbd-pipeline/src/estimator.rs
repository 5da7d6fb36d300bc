//! Frame-to-frame pose estimation.
//!
//! [`RelativePoseEstimator`] owns a target frame with a known pose and
//! estimates the pose of each source frame handed to it:
//!
//! 1. extract and back-project target features (cached until the target changes),
//! 2. extract source features,
//! 3. ratio-test matching, then pairing target 3D points with source
//!    `(u, v, depth)` observations,
//! 4. robust rigid solve in the color-camera frame, seeded from the target pose,
//! 5. optional dense refinement on smoothed, oriented point clouds,
//! 6. conversion of the result back into the depth-camera frame.
//!
//! Broken caller contracts come back as [`PreconditionError`]; data-dependent
//! failures make `estimate_new_pose` return `Ok(false)` and are described in
//! [`RelativePoseEstimator::last_report`].

use std::time::Instant;

use log::{debug, info, warn};
use rgbd_core::{
    BruteForceMatcher, DepthPose, DepthProcessor, FeatureExtractor, FeatureMatcher, FeatureSet,
    Frame, FrameProcessor, NormalSpaceSampler, OrientedCloud, PointCloudSampler,
    PreconditionError, Real, Vec3,
};
use rgbd_linear::{RansacRigidSolver, RobustPoseSolver};
use rgbd_optim::{PoseRefiner, RefineInput, RgbdIcp};

use crate::dense::{filtered_cloud, lift, sampled_cloud, select};
use crate::{EstimationFailure, EstimationReport, EstimatorConfig, EstimatorState, RefinementStatus};

/// Why a stage stopped: a broken contract or a rejected estimate.
enum StageError {
    Fatal(PreconditionError),
    Failed(EstimationFailure),
}

impl From<PreconditionError> for StageError {
    fn from(e: PreconditionError) -> Self {
        StageError::Fatal(e)
    }
}

impl From<EstimationFailure> for StageError {
    fn from(e: EstimationFailure) -> Self {
        StageError::Failed(e)
    }
}

fn elapsed_ms(since: Instant) -> f64 {
    since.elapsed().as_secs_f64() * 1e3
}

fn extract(
    extractor: &dyn FeatureExtractor,
    frame: &Frame,
    config: &EstimatorConfig,
) -> Result<FeatureSet, StageError> {
    let started = Instant::now();
    let set = FeatureSet::extract(frame, extractor, &config.features).map_err(|e| {
        match e.downcast::<PreconditionError>() {
            Ok(precondition) => StageError::Fatal(precondition),
            Err(e) => StageError::Failed(EstimationFailure::Extraction {
                reason: format!("{e:#}"),
            }),
        }
    })?;
    debug!(
        "frame {}: {} features in {:.2} ms",
        frame.id(),
        set.len(),
        elapsed_ms(started)
    );
    Ok(set)
}

/// Estimates the pose of a source frame relative to a cached target.
///
/// One instance handles one request at a time; run one estimator per worker
/// to track several streams.
///
/// # Example
///
/// ```no_run
/// use rgbd_core::synthetic::scenario::SyntheticScenario;
/// use rgbd_pipeline::{EstimatorConfig, RelativePoseEstimator};
///
/// # fn main() -> anyhow::Result<()> {
/// let frames = SyntheticScenario::default().build()?;
/// let mut estimator = RelativePoseEstimator::new(EstimatorConfig::default(), frames.extractor);
/// estimator.set_target_image(frames.target)?;
/// estimator.set_source_image(frames.source)?;
/// if estimator.estimate_new_pose()? {
///     println!("{:?}", estimator.estimated_pose());
/// }
/// # Ok(())
/// # }
/// ```
pub struct RelativePoseEstimator {
    config: EstimatorConfig,

    extractor: Box<dyn FeatureExtractor + Send>,
    matcher: Box<dyn FeatureMatcher + Send>,
    solver: Box<dyn RobustPoseSolver + Send>,
    processor: Box<dyn FrameProcessor + Send>,
    sampler: Box<dyn PointCloudSampler + Send>,
    refiner: Box<dyn PoseRefiner + Send>,

    target_frame: Option<Frame>,
    target_features: FeatureSet,
    target_pose: Option<DepthPose>,
    /// Dense target cloud, kept while the target frame is unchanged.
    target_cloud: Option<OrientedCloud>,

    source_frame: Option<Frame>,
    source_features: FeatureSet,

    estimated_pose: Option<DepthPose>,
    num_matches: usize,
    last_report: Option<EstimationReport>,
}

impl RelativePoseEstimator {
    // ─────────────────────────────────────────────────────────────────────────
    // Construction
    // ─────────────────────────────────────────────────────────────────────────

    /// Estimator with the default matcher, solver, processor, sampler and
    /// refiner, each configured from `config`.
    pub fn new(config: EstimatorConfig, extractor: impl FeatureExtractor + Send + 'static) -> Self {
        Self {
            matcher: Box::new(BruteForceMatcher),
            solver: Box::new(RansacRigidSolver::new(config.ransac.clone())),
            processor: Box::new(DepthProcessor::new(config.refinement.smoothing.clone())),
            sampler: Box::new(NormalSpaceSampler::new(config.refinement.sampler.clone())),
            refiner: Box::new(RgbdIcp::new(config.refinement.icp.clone())),
            extractor: Box::new(extractor),
            config,
            target_frame: None,
            target_features: FeatureSet::new(),
            target_pose: None,
            target_cloud: None,
            source_frame: None,
            source_features: FeatureSet::new(),
            estimated_pose: None,
            num_matches: 0,
            last_report: None,
        }
    }

    pub fn with_matcher(mut self, matcher: impl FeatureMatcher + Send + 'static) -> Self {
        self.matcher = Box::new(matcher);
        self
    }

    pub fn with_solver(mut self, solver: impl RobustPoseSolver + Send + 'static) -> Self {
        self.solver = Box::new(solver);
        self
    }

    pub fn with_processor(mut self, processor: impl FrameProcessor + Send + 'static) -> Self {
        self.processor = Box::new(processor);
        self.target_cloud = None;
        self
    }

    pub fn with_sampler(mut self, sampler: impl PointCloudSampler + Send + 'static) -> Self {
        self.sampler = Box::new(sampler);
        self
    }

    pub fn with_refiner(mut self, refiner: impl PoseRefiner + Send + 'static) -> Self {
        self.refiner = Box::new(refiner);
        self
    }

    pub fn config(&self) -> &EstimatorConfig {
        &self.config
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Target and source
    // ─────────────────────────────────────────────────────────────────────────

    /// Use `frame` as the reference for subsequent estimates.
    ///
    /// Unless a target pose is already set, the frame's own depth-camera pose
    /// becomes the target pose. Target features are re-extracted on the next
    /// estimate.
    pub fn set_target_image(&mut self, frame: Frame) -> Result<(), PreconditionError> {
        self.adopt_target(frame, FeatureSet::new())
    }

    /// Like [`Self::set_target_image`], adopting already extracted features.
    /// They are back-projected on the next estimate if they lack 3D locations.
    pub fn set_target_image_with_features(
        &mut self,
        frame: Frame,
        features: FeatureSet,
    ) -> Result<(), PreconditionError> {
        self.adopt_target(frame, features)
    }

    fn adopt_target(&mut self, frame: Frame, features: FeatureSet) -> Result<(), PreconditionError> {
        let own_pose = frame
            .depth_pose()
            .ok_or(PreconditionError::MissingCalibration)?;
        if self.target_pose.is_none() {
            self.target_pose = Some(own_pose);
        }
        self.target_frame = Some(frame);
        self.target_features = features;
        self.target_cloud = None;
        self.estimated_pose = None;
        Ok(())
    }

    /// Override the target pose. Target 3D locations are recomputed on the
    /// next estimate.
    pub fn set_target_pose(&mut self, pose: DepthPose) {
        self.target_pose = Some(pose);
        self.target_features.clear_3d_locations();
        self.estimated_pose = None;
    }

    /// Frame whose pose the next estimate computes.
    pub fn set_source_image(&mut self, frame: Frame) -> Result<(), PreconditionError> {
        self.set_source_image_with_features(frame, FeatureSet::new())
    }

    pub fn set_source_image_with_features(
        &mut self,
        frame: Frame,
        features: FeatureSet,
    ) -> Result<(), PreconditionError> {
        if frame.calibration().is_none() {
            return Err(PreconditionError::MissingCalibration);
        }
        self.source_frame = Some(frame);
        self.source_features = features;
        self.estimated_pose = None;
        Ok(())
    }

    /// Forget the target frame, its features and pose, and any estimate.
    pub fn reset_target(&mut self) {
        self.target_frame = None;
        self.target_features = FeatureSet::new();
        self.target_pose = None;
        self.target_cloud = None;
        self.estimated_pose = None;
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Accessors
    // ─────────────────────────────────────────────────────────────────────────

    pub fn state(&self) -> EstimatorState {
        match (&self.target_frame, &self.estimated_pose) {
            (None, _) => EstimatorState::NoTarget,
            (Some(_), None) => EstimatorState::TargetSet,
            (Some(_), Some(_)) => EstimatorState::PoseEstimated,
        }
    }

    /// Depth-camera pose of the source frame from the last successful estimate.
    pub fn estimated_pose(&self) -> Option<DepthPose> {
        self.estimated_pose
    }

    /// Descriptor matches found by the last estimate.
    pub fn num_matches(&self) -> usize {
        self.num_matches
    }

    pub fn last_report(&self) -> Option<&EstimationReport> {
        self.last_report.as_ref()
    }

    pub fn target_pose(&self) -> Option<DepthPose> {
        self.target_pose
    }

    pub fn target_features(&self) -> &FeatureSet {
        &self.target_features
    }

    pub fn source_features(&self) -> &FeatureSet {
        &self.source_features
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Estimation
    // ─────────────────────────────────────────────────────────────────────────

    /// Estimate the source frame's pose.
    ///
    /// `Ok(true)` when a pose was produced, `Ok(false)` when the data did not
    /// support one.
    ///
    /// # Errors
    ///
    /// A missing target or source frame, a frame without calibration or
    /// mapped depth, or a match that pairs a target feature without depth.
    pub fn estimate_new_pose(&mut self) -> Result<bool, PreconditionError> {
        self.estimated_pose = None;
        self.last_report = None;
        self.num_matches = 0;

        let started = Instant::now();
        let mut report = EstimationReport::default();
        let succeeded = match self.run(&mut report) {
            Ok(pose) => {
                self.estimated_pose = Some(pose);
                true
            }
            Err(StageError::Failed(failure)) => {
                info!("pose estimation failed: {failure}");
                report.failure = Some(failure);
                false
            }
            Err(StageError::Fatal(e)) => return Err(e),
        };
        debug!("estimate_new_pose: {:.2} ms", elapsed_ms(started));

        self.last_report = Some(report);
        Ok(succeeded)
    }

    fn run(&mut self, report: &mut EstimationReport) -> Result<DepthPose, StageError> {
        let target = self
            .target_frame
            .as_ref()
            .ok_or(PreconditionError::MissingTargetFrame)?;
        let source = self
            .source_frame
            .as_ref()
            .ok_or(PreconditionError::MissingSourceFrame)?;
        let target_calib = target
            .calibration()
            .ok_or(PreconditionError::MissingCalibration)?;
        let source_calib = source
            .calibration()
            .ok_or(PreconditionError::MissingCalibration)?;
        if source.mapped_depth().is_none() {
            return Err(PreconditionError::MissingMappedDepth.into());
        }
        let target_pose = self
            .target_pose
            .ok_or(PreconditionError::MissingTargetPose)?;

        if self.target_features.is_empty() {
            self.target_features = extract(self.extractor.as_ref(), target, &self.config)?;
        }
        if !self.target_features.has_3d_locations() {
            self.target_features
                .compute_3d_locations(&target_pose.to_color_camera_with(target_calib));
        }
        if self.source_features.is_empty() {
            self.source_features = extract(self.extractor.as_ref(), source, &self.config)?;
        }

        let started = Instant::now();
        let matches = self.target_features.match_with(
            &self.source_features,
            self.matcher.as_ref(),
            self.config.match_ratio_sq,
        );
        self.num_matches = matches.len();
        report.num_matches = matches.len();
        debug!("matching: {} pairs in {:.2} ms", matches.len(), elapsed_ms(started));
        if matches.len() < self.config.min_matches {
            return Err(EstimationFailure::NotEnoughMatches {
                found: matches.len(),
                needed: self.config.min_matches,
            }
            .into());
        }

        let mut target_points = Vec::with_capacity(matches.len());
        let mut observations = Vec::with_capacity(matches.len());
        for c in &matches {
            let t = &self.target_features.points()[c.target_idx];
            let p3d = match t.p3d {
                Some(p) if t.has_depth() => p,
                _ => {
                    return Err(PreconditionError::TargetPointWithoutDepth {
                        target_idx: c.target_idx,
                    }
                    .into())
                }
            };
            let s = &self.source_features.points()[c.source_idx];
            if !s.has_depth() {
                continue;
            }
            target_points.push(p3d);
            observations.push(Vec3::new(s.pt.x, s.pt.y, s.depth));
        }
        report.num_depth_pairs = target_points.len();
        if target_points.len() < self.config.min_depth_pairs {
            return Err(EstimationFailure::NotEnoughDepthPairs {
                found: target_points.len(),
                needed: self.config.min_depth_pairs,
            }
            .into());
        }

        // Keypoints live on the color image, so the solve runs in the color
        // camera of the source frame.
        let seed = target_pose.to_color_camera_with(source_calib);
        let started = Instant::now();
        let solve = self
            .solver
            .solve(
                &seed,
                &target_points,
                &observations,
                self.config.use_depth_residual,
            )
            .map_err(EstimationFailure::from)?;
        let residual = solve.error / target_points.len() as Real;
        report.num_inliers = solve.num_inliers();
        report.normalized_residual = Some(residual);
        debug!(
            "robust solve: {}/{} inliers, residual {:.5} in {:.2} ms",
            solve.num_inliers(),
            target_points.len(),
            residual,
            elapsed_ms(started)
        );
        if residual > self.config.max_normalized_residual {
            return Err(EstimationFailure::ResidualTooLarge {
                residual,
                max: self.config.max_normalized_residual,
            }
            .into());
        }

        let mut color_pose = solve.pose;
        if self.config.refinement.enabled {
            let cfg = &self.config.refinement;
            let started = Instant::now();
            let target_cloud = match self.target_cloud.take() {
                Some(cloud) => Ok(cloud),
                None => filtered_cloud(self.processor.as_ref(), target, cfg.cloud_stride),
            };
            let clouds = target_cloud.and_then(|target_cloud| {
                let source_cloud = sampled_cloud(
                    self.processor.as_ref(),
                    self.sampler.as_ref(),
                    source,
                    cfg.cloud_stride,
                    cfg.source_samples,
                )?;
                Ok((source_cloud, target_cloud))
            });

            report.refinement = match clouds {
                Ok((source_cloud, target_cloud)) => {
                    let feature_target = select(&target_points, &solve.inliers);
                    let feature_source = lift(
                        solve.pose.intrinsics(),
                        &select(&observations, &solve.inliers),
                    );
                    let target_color = target_pose.to_color_camera_with(target_calib);
                    let outcome = self.refiner.refine(&RefineInput {
                        seed: &solve.pose,
                        target_pose: &target_color,
                        feature_target: &feature_target,
                        feature_source: &feature_source,
                        source_cloud: &source_cloud,
                        target_cloud: &target_cloud,
                    });
                    self.target_cloud = Some(target_cloud);

                    match outcome {
                        Ok(refined) => {
                            color_pose = refined.pose;
                            RefinementStatus::Refined {
                                iterations: refined.iterations,
                                num_correspondences: refined.num_correspondences,
                                rms: refined.rms,
                            }
                        }
                        Err(e) => {
                            warn!("dense refinement failed, keeping the robust estimate: {e}");
                            RefinementStatus::Failed {
                                reason: e.to_string(),
                            }
                        }
                    }
                }
                Err(e) => {
                    warn!("no dense clouds for refinement, keeping the robust estimate: {e}");
                    RefinementStatus::Failed {
                        reason: e.to_string(),
                    }
                }
            };
            debug!("refinement: {:.2} ms", elapsed_ms(started));
        }

        Ok(color_pose.to_depth_camera_with(source_calib))
    }
}
