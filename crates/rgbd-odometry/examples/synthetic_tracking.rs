//! Track a camera along a short synthetic trajectory.
//!
//! Each frame is estimated against the previous one, chaining the estimates
//! into an odometry path; the final drift against ground truth is printed.
//!
//! Run with: `cargo run -p rgbd-odometry --example synthetic_tracking`
//! (set `RUST_LOG=debug` for per-stage timings).

use anyhow::Result;
use rgbd_odometry::core::{rotation_angle_between, translation_distance};
use rgbd_odometry::prelude::*;
use rgbd_odometry::synthetic::noise::GaussianNoise;
use rgbd_odometry::synthetic::scenario::PoseSpec;
use rgbd_odometry::synthetic::scene::{SceneConfig, SyntheticScene};

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let scene = SyntheticScene::new(SceneConfig::default());
    let trajectory: Vec<Iso3> = (0..6)
        .map(|i| {
            let s = i as Real;
            PoseSpec {
                translation: [0.03 * s, -0.01 * s, 0.005 * s],
                rotation_rpy: [0.0, 0.004 * s, -0.003 * s],
            }
            .to_iso()
        })
        .collect();

    let mut config = EstimatorConfig::default();
    config.refinement.enabled = true;
    let extractor = scene.extractor(GaussianNoise::new(3, 0.1));
    let mut estimator = RelativePoseEstimator::new(config, extractor);

    let mut previous = scene.render(0, trajectory[0])?;
    let mut path = vec![previous.depth_pose().expect("rendered frames are calibrated")];

    for (id, truth) in trajectory.iter().enumerate().skip(1) {
        let frame = scene.render(id as u64, *truth)?;

        estimator.reset_target();
        estimator.set_target_pose(*path.last().expect("path starts with the first pose"));
        estimator.set_target_image(previous)?;
        estimator.set_source_image(frame.clone())?;

        if !estimator.estimate_new_pose()? {
            println!("frame {id}: skipped ({:?})", estimator.last_report());
            path.push(*path.last().expect("non-empty"));
            previous = frame;
            continue;
        }

        let pose = estimator.estimated_pose().expect("estimate succeeded");
        let report = estimator.last_report().expect("report of the last call");
        println!(
            "frame {id}: {} matches, {} inliers, residual {:.5}, refinement {:?}",
            report.num_matches,
            report.num_inliers,
            report.normalized_residual.unwrap_or_default(),
            report.refinement,
        );
        path.push(pose);
        previous = frame;
    }

    let last = path.last().expect("non-empty");
    let goal = trajectory.last().expect("non-empty");
    println!(
        "drift after {} frames: {:.2} mm, {:.4} deg",
        trajectory.len() - 1,
        translation_distance(last.cam_se3_world(), goal) * 1e3,
        rotation_angle_between(last.cam_se3_world(), goal).to_degrees(),
    );
    Ok(())
}
