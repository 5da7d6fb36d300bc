use nalgebra::{Rotation3, Translation3};
use rgbd_core::synthetic::noise::{GaussianNoise, UniformNoise};
use rgbd_core::synthetic::rigid::{rigid_correspondences, RigidCorrespondenceOptions};
use rgbd_core::{rotation_angle_between, translation_distance, ColorPose, FxFyCxCySkew, Iso3, Real};
use rgbd_linear::{RansacRigidSolver, RigidRansacOptions, RobustPoseSolver};

fn k() -> FxFyCxCySkew<Real> {
    FxFyCxCySkew::new(150.0, 150.0, 79.5, 59.5)
}

fn gt() -> Iso3 {
    Iso3::from_parts(
        Translation3::new(-0.12, 0.04, 0.05),
        Rotation3::from_euler_angles(-0.02, 0.05, 0.01).into(),
    )
}

#[test]
fn minority_outliers_do_not_bias_the_pose() {
    let opts = RigidCorrespondenceOptions {
        num_points: 40,
        outlier_every: 4,
        ..Default::default()
    };
    let data = rigid_correspondences(&gt(), &k(), &opts);
    let res = RansacRigidSolver::default()
        .solve(&ColorPose::identity(k()), &data.target, &data.observations, false)
        .unwrap();

    assert!(translation_distance(res.pose.cam_se3_world(), &gt()) < 1e-9);
    assert!(rotation_angle_between(res.pose.cam_se3_world(), &gt()) < 1e-9);
    for (i, (&inlier, &outlier)) in res.inliers.iter().zip(&data.is_outlier).enumerate() {
        assert_eq!(inlier, !outlier, "pair {i}");
    }
    assert!(res.error < 1e-9);
}

#[test]
fn small_noise_stays_well_under_the_acceptance_threshold() {
    let opts = RigidCorrespondenceOptions {
        num_points: 40,
        pixel_noise: GaussianNoise::new(3, 0.1),
        depth_noise: GaussianNoise::new(4, 0.002),
        ..Default::default()
    };
    let data = rigid_correspondences(&gt(), &k(), &opts);
    let res = RansacRigidSolver::default()
        .solve(&ColorPose::identity(k()), &data.target, &data.observations, false)
        .unwrap();

    assert_eq!(res.num_inliers(), 40);
    let normalized = res.error / data.target.len() as Real;
    assert!(normalized < 0.005, "normalized residual {normalized}");
    assert!(translation_distance(res.pose.cam_se3_world(), &gt()) < 5e-3);
    assert!(rotation_angle_between(res.pose.cam_se3_world(), &gt()) < 5e-3);
}

#[test]
fn noise_above_tolerance_is_visible_in_the_residual() {
    let opts = RigidCorrespondenceOptions {
        num_points: 40,
        pixel_uniform: UniformNoise::new(11, 1.5),
        ..Default::default()
    };
    let data = rigid_correspondences(&gt(), &k(), &opts);
    let res = RansacRigidSolver::default()
        .solve(&ColorPose::identity(k()), &data.target, &data.observations, false)
        .unwrap();

    let normalized = res.error / data.target.len() as Real;
    assert!(normalized > 0.005, "normalized residual {normalized}");
}

#[test]
fn depth_residual_penalizes_depth_errors() {
    let opts = RigidCorrespondenceOptions {
        num_points: 30,
        depth_noise: GaussianNoise::new(5, 0.01),
        ..Default::default()
    };
    let data = rigid_correspondences(&gt(), &k(), &opts);
    let solver = RansacRigidSolver::default();
    let seed = ColorPose::identity(k());
    let lateral = solver
        .solve(&seed, &data.target, &data.observations, false)
        .unwrap();
    let full = solver
        .solve(&seed, &data.target, &data.observations, true)
        .unwrap();
    assert!(full.error > lateral.error);
}

#[test]
fn seed_pose_alone_can_carry_the_solve() {
    let opts = RigidCorrespondenceOptions {
        num_points: 12,
        ..Default::default()
    };
    let data = rigid_correspondences(&gt(), &k(), &opts);
    let solver = RansacRigidSolver::new(RigidRansacOptions {
        ransac: rgbd_core::RansacOptions {
            // No hypotheses at all: only the seed is scored.
            max_iters: 0,
            ..Default::default()
        },
        try_seed: true,
    });
    let seed = ColorPose::new(gt(), k());
    let res = solver
        .solve(&seed, &data.target, &data.observations, false)
        .unwrap();
    assert_eq!(res.num_inliers(), 12);
    assert!(translation_distance(res.pose.cam_se3_world(), &gt()) < 1e-9);

    let no_seed = RansacRigidSolver::new(RigidRansacOptions {
        try_seed: false,
        ..solver.opts.clone()
    });
    assert!(no_seed
        .solve(&seed, &data.target, &data.observations, false)
        .is_err());
}

#[test]
fn options_load_from_flat_json() {
    let opts: RigidRansacOptions =
        serde_json::from_str(r#"{ "thresh": 0.02, "seed": 5, "try_seed": false }"#).unwrap();
    assert_eq!(opts.ransac.thresh, 0.02);
    assert_eq!(opts.ransac.seed, 5);
    assert_eq!(opts.ransac.min_inliers, 6);
    assert!(!opts.try_seed);
}
