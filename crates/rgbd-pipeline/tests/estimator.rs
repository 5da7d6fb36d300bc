use rgbd_core::{
    rotation_angle_between, synthetic::scenario::ScenarioFrames,
    synthetic::scenario::SyntheticScenario, translation_distance, Correspondence, FeatureMatcher,
    FeatureParams, FeatureSet, Frame, Iso3, PreconditionError, Real,
};
use rgbd_optim::{PoseRefiner, RefineError, RefineInput, Refinement};
use rgbd_pipeline::{
    EstimationFailure, EstimatorConfig, EstimatorState, RefinementStatus, RelativePoseEstimator,
};

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn frames() -> ScenarioFrames {
    SyntheticScenario::default().build().unwrap()
}

fn ready(config: EstimatorConfig) -> (RelativePoseEstimator, Iso3) {
    let frames = frames();
    let truth = *frames.source.depth_se3_world();
    let mut estimator = RelativePoseEstimator::new(config, frames.extractor);
    estimator.set_target_image(frames.target).unwrap();
    estimator.set_source_image(frames.source).unwrap();
    (estimator, truth)
}

fn assert_close(estimated: &Iso3, expected: &Iso3, tol: Real) {
    let dt = translation_distance(estimated, expected);
    let dr = rotation_angle_between(estimated, expected);
    assert!(dt < tol, "translation off by {dt}");
    assert!(dr < tol, "rotation off by {dr}");
}

struct FailingRefiner;

impl PoseRefiner for FailingRefiner {
    fn refine(&self, _input: &RefineInput<'_>) -> Result<Refinement, RefineError> {
        Err(RefineError::NotConverged { iterations: 0 })
    }
}

/// Pairs the i-th target feature with the i-th source feature.
struct IndexMatcher;

impl FeatureMatcher for IndexMatcher {
    fn match_sets(&self, target: &FeatureSet, source: &FeatureSet, _ratio_sq: Real) -> Vec<Correspondence> {
        (0..target.len().min(source.len()))
            .map(|i| Correspondence {
                target_idx: i,
                source_idx: i,
                distance_sq: 0.0,
            })
            .collect()
    }
}

#[test]
fn recovers_a_pure_translation() {
    init_logger();
    let (mut estimator, truth) = ready(EstimatorConfig::default());
    assert!(estimator.estimate_new_pose().unwrap());

    let pose = estimator.estimated_pose().unwrap();
    assert_close(pose.cam_se3_world(), &Iso3::translation(0.1, 0.0, 0.0), 1e-3);
    assert_close(pose.cam_se3_world(), &truth, 1e-3);
    assert!(estimator.num_matches() >= 20);

    let report = estimator.last_report().unwrap();
    assert!(report.succeeded());
    assert_eq!(report.refinement, RefinementStatus::Skipped);
    assert!(report.num_inliers >= 20);
    assert!(report.normalized_residual.unwrap() < 0.005);
    assert_eq!(estimator.state(), EstimatorState::PoseEstimated);
}

#[test]
fn repeated_estimates_are_identical() {
    let (mut estimator, _) = ready(EstimatorConfig::default());
    assert!(estimator.estimate_new_pose().unwrap());
    let first = estimator.estimated_pose().unwrap();
    let target_features = estimator.target_features().clone();
    let matches = estimator.num_matches();

    assert!(estimator.estimate_new_pose().unwrap());
    assert_eq!(estimator.estimated_pose().unwrap(), first);
    assert_eq!(estimator.target_features(), &target_features);
    assert_eq!(estimator.num_matches(), matches);
}

#[test]
fn fewer_than_ten_depth_pairs_fail() {
    let frames = frames();
    let params = FeatureParams::default();
    let target_features = FeatureSet::extract(&frames.target, &frames.extractor, &params).unwrap();
    let source_features = FeatureSet::extract(&frames.source, &frames.extractor, &params).unwrap();

    // Keep depth on nine source points that are also seen by the target.
    let mut kept = 0;
    let points = source_features
        .points()
        .iter()
        .map(|p| {
            let mut p = p.clone();
            let shared = target_features
                .points()
                .iter()
                .any(|t| t.descriptor == p.descriptor);
            if shared && kept < 9 {
                kept += 1;
            } else {
                p.depth = 0.0;
            }
            p
        })
        .collect();
    assert_eq!(kept, 9);

    let mut estimator = RelativePoseEstimator::new(EstimatorConfig::default(), frames.extractor);
    estimator.set_target_image(frames.target).unwrap();
    estimator
        .set_source_image_with_features(frames.source, FeatureSet::from_points(points))
        .unwrap();

    assert!(!estimator.estimate_new_pose().unwrap());
    let report = estimator.last_report().unwrap();
    assert!(report.num_matches >= 10);
    assert_eq!(
        report.failure,
        Some(EstimationFailure::NotEnoughDepthPairs {
            found: 9,
            needed: 10
        })
    );
    assert!(estimator.estimated_pose().is_none());
    assert_eq!(estimator.state(), EstimatorState::TargetSet);
}

#[test]
fn too_few_matches_fail_before_solving() {
    let config = EstimatorConfig {
        min_matches: 1000,
        ..EstimatorConfig::default()
    };
    let (mut estimator, _) = ready(config);
    assert!(!estimator.estimate_new_pose().unwrap());
    let report = estimator.last_report().unwrap();
    assert!(matches!(
        report.failure,
        Some(EstimationFailure::NotEnoughMatches { needed: 1000, .. })
    ));
    assert_eq!(report.num_depth_pairs, 0);
}

#[test]
fn large_residual_is_rejected() {
    let config = EstimatorConfig {
        max_normalized_residual: 1e-7,
        ..EstimatorConfig::default()
    };
    let (mut estimator, _) = ready(config);
    assert!(!estimator.estimate_new_pose().unwrap());
    let report = estimator.last_report().unwrap();
    assert!(matches!(
        report.failure,
        Some(EstimationFailure::ResidualTooLarge { .. })
    ));
    assert!(report.normalized_residual.unwrap() > 1e-7);
}

#[test]
fn noisy_keypoints_fail_the_default_residual_check() {
    let scenario = SyntheticScenario {
        pixel_noise_sigma: 1.0,
        ..SyntheticScenario::default()
    };
    let frames = scenario.build().unwrap();
    let config = EstimatorConfig::default();
    assert_eq!(config.max_normalized_residual, 0.005);

    let mut estimator = RelativePoseEstimator::new(config, frames.extractor);
    estimator.set_target_image(frames.target).unwrap();
    estimator.set_source_image(frames.source).unwrap();

    assert!(!estimator.estimate_new_pose().unwrap());
    let report = estimator.last_report().unwrap();
    assert!(
        matches!(report.failure, Some(EstimationFailure::ResidualTooLarge { .. })),
        "{:?}",
        report.failure
    );
    assert!(report.normalized_residual.unwrap() > 0.005);
    assert!(estimator.estimated_pose().is_none());
}

#[test]
fn dense_refinement_keeps_the_estimate_accurate() {
    init_logger();
    let mut config = EstimatorConfig::default();
    config.refinement.enabled = true;
    let (mut estimator, truth) = ready(config);
    assert!(estimator.estimate_new_pose().unwrap());

    let report = estimator.last_report().unwrap();
    assert!(
        matches!(report.refinement, RefinementStatus::Refined { .. }),
        "{:?}",
        report.refinement
    );
    assert_close(estimator.estimated_pose().unwrap().cam_se3_world(), &truth, 1e-3);
}

#[test]
fn failed_refinement_falls_back_to_the_robust_pose() {
    let (mut plain, _) = ready(EstimatorConfig::default());
    assert!(plain.estimate_new_pose().unwrap());

    let mut config = EstimatorConfig::default();
    config.refinement.enabled = true;
    let frames = frames();
    let mut refined = RelativePoseEstimator::new(config, frames.extractor).with_refiner(FailingRefiner);
    refined.set_target_image(frames.target).unwrap();
    refined.set_source_image(frames.source).unwrap();

    assert!(refined.estimate_new_pose().unwrap());
    assert_eq!(refined.estimated_pose(), plain.estimated_pose());
    let status = &refined.last_report().unwrap().refinement;
    assert!(status.is_degraded());
}

#[test]
fn target_without_mapped_depth_only_degrades_refinement() {
    let frames = frames();
    let truth = *frames.source.depth_se3_world();
    let target_features =
        FeatureSet::extract(&frames.target, &frames.extractor, &FeatureParams::default()).unwrap();
    let mut target = Frame::new(
        frames.target.id(),
        frames.target.color().clone(),
        frames.target.depth().clone(),
    )
    .with_calibration(frames.scene.calibration());
    target.set_depth_se3_world(*frames.target.depth_se3_world());
    assert!(target.mapped_depth().is_none());

    let mut config = EstimatorConfig::default();
    config.refinement.enabled = true;
    let mut estimator = RelativePoseEstimator::new(config, frames.extractor);
    estimator
        .set_target_image_with_features(target, target_features)
        .unwrap();
    estimator.set_source_image(frames.source).unwrap();

    assert!(estimator.estimate_new_pose().unwrap());
    let status = &estimator.last_report().unwrap().refinement;
    assert!(status.is_degraded(), "{status:?}");
    assert_close(estimator.estimated_pose().unwrap().cam_se3_world(), &truth, 1e-3);
}

#[test]
fn match_count_is_cleared_by_every_call() {
    let frames = frames();
    let calibration = frames.scene.calibration();
    let bare = Frame::new(9, frames.source.color().clone(), frames.source.depth().clone())
        .with_calibration(calibration);

    let mut estimator = RelativePoseEstimator::new(EstimatorConfig::default(), frames.extractor);
    estimator.set_target_image(frames.target).unwrap();
    estimator.set_source_image(frames.source).unwrap();
    assert!(estimator.estimate_new_pose().unwrap());
    assert!(estimator.num_matches() > 0);

    estimator.set_source_image(bare).unwrap();
    assert_eq!(
        estimator.estimate_new_pose(),
        Err(PreconditionError::MissingMappedDepth)
    );
    assert_eq!(estimator.num_matches(), 0);
}

#[test]
fn explicit_target_pose_moves_the_estimate() {
    let (mut estimator, truth) = ready(EstimatorConfig::default());
    let offset = Iso3::translation(0.0, 0.05, 0.0);
    let target = estimator.target_pose().unwrap();
    estimator.set_target_pose(target.with_transform(offset));
    assert_eq!(estimator.state(), EstimatorState::TargetSet);

    assert!(estimator.estimate_new_pose().unwrap());
    assert_close(
        estimator.estimated_pose().unwrap().cam_se3_world(),
        &(truth * offset),
        1e-3,
    );
}

#[test]
fn adopted_target_features_are_back_projected() {
    let frames = frames();
    let target_features =
        FeatureSet::extract(&frames.target, &frames.extractor, &FeatureParams::default()).unwrap();
    assert!(!target_features.has_3d_locations());

    let mut estimator = RelativePoseEstimator::new(EstimatorConfig::default(), frames.extractor);
    estimator
        .set_target_image_with_features(frames.target, target_features)
        .unwrap();
    estimator.set_source_image(frames.source).unwrap();
    assert!(estimator.estimate_new_pose().unwrap());
    assert!(estimator.target_features().has_3d_locations());
}

#[test]
fn broken_contracts_are_fatal() {
    let frames = frames();
    let calibration = frames.scene.calibration();
    let mut estimator =
        RelativePoseEstimator::new(EstimatorConfig::default(), frames.extractor.clone());
    assert_eq!(
        estimator.estimate_new_pose(),
        Err(PreconditionError::MissingTargetFrame)
    );

    let bare = Frame::new(7, frames.target.color().clone(), frames.target.depth().clone());
    assert_eq!(
        estimator.set_target_image(bare.clone()),
        Err(PreconditionError::MissingCalibration)
    );
    assert_eq!(estimator.state(), EstimatorState::NoTarget);

    estimator.set_target_image(frames.target.clone()).unwrap();
    assert_eq!(
        estimator.estimate_new_pose(),
        Err(PreconditionError::MissingSourceFrame)
    );

    estimator
        .set_source_image(bare.with_calibration(calibration))
        .unwrap();
    assert_eq!(
        estimator.estimate_new_pose(),
        Err(PreconditionError::MissingMappedDepth)
    );
    assert!(estimator.last_report().is_none());
}

#[test]
fn pairing_a_target_without_depth_is_fatal() {
    let frames = frames();
    let extracted =
        FeatureSet::extract(&frames.target, &frames.extractor, &FeatureParams::default()).unwrap();
    let mut points = extracted.points().to_vec();
    points[0].depth = 0.0;

    let mut estimator = RelativePoseEstimator::new(EstimatorConfig::default(), frames.extractor)
        .with_matcher(IndexMatcher);
    estimator
        .set_target_image_with_features(frames.target, FeatureSet::from_points(points))
        .unwrap();
    estimator.set_source_image(frames.source).unwrap();
    assert_eq!(
        estimator.estimate_new_pose(),
        Err(PreconditionError::TargetPointWithoutDepth { target_idx: 0 })
    );
}

#[test]
fn state_follows_target_and_source_changes() {
    let frames = frames();
    let mut estimator =
        RelativePoseEstimator::new(EstimatorConfig::default(), frames.extractor.clone());
    assert_eq!(estimator.state(), EstimatorState::NoTarget);

    estimator.set_target_image(frames.target.clone()).unwrap();
    estimator.set_source_image(frames.source.clone()).unwrap();
    assert_eq!(estimator.state(), EstimatorState::TargetSet);
    assert!(estimator.estimate_new_pose().unwrap());
    assert_eq!(estimator.state(), EstimatorState::PoseEstimated);

    estimator.set_source_image(frames.source).unwrap();
    assert_eq!(estimator.state(), EstimatorState::TargetSet);
    assert!(estimator.estimated_pose().is_none());

    estimator.reset_target();
    assert_eq!(estimator.state(), EstimatorState::NoTarget);
    assert!(estimator.target_pose().is_none());
    assert!(estimator.target_features().is_empty());
}
