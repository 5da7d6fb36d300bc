use std::{fs, path::Path};

use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use rgbd_core::{
    rotation_angle_between, synthetic::scenario::PoseSpec, synthetic::scenario::SyntheticScenario,
    translation_distance, Iso3, Real,
};
use rgbd_pipeline::{EstimationReport, EstimatorConfig, RelativePoseEstimator};
use serde::{Deserialize, Serialize};

/// Estimate the relative pose between the two frames of a synthetic scenario.
#[derive(Debug, Parser)]
#[command(author, version, about = "RGB-D relative pose estimation on a synthetic scenario")]
struct Args {
    /// Path to a JSON SyntheticScenario. The built-in scenario is used if omitted.
    #[arg(long)]
    scenario: Option<String>,

    /// Optional path to a JSON EstimatorConfig. Defaults are used if omitted.
    #[arg(long)]
    config: Option<String>,
}

/// What the tool prints.
#[derive(Debug, Serialize, Deserialize)]
struct CliReport {
    success: bool,
    /// Estimated `cam_se3_world` of the source depth camera.
    estimated_pose: Option<PoseSpec>,
    ground_truth: PoseSpec,
    translation_error: Option<Real>,
    rotation_error: Option<Real>,
    num_matches: usize,
    report: EstimationReport,
}

fn pose_spec(iso: &Iso3) -> PoseSpec {
    let t = iso.translation.vector;
    let (roll, pitch, yaw) = iso.rotation.euler_angles();
    PoseSpec {
        translation: [t.x, t.y, t.z],
        rotation_rpy: [roll, pitch, yaw],
    }
}

fn load_json_file<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let data =
        fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&data).with_context(|| format!("parsing {}", path.display()))
}

fn run_from_files(scenario_path: Option<&str>, config_path: Option<&str>) -> Result<CliReport> {
    let scenario: SyntheticScenario = match scenario_path {
        Some(path) => load_json_file(Path::new(path))?,
        None => SyntheticScenario::default(),
    };
    let config: EstimatorConfig = match config_path {
        Some(path) => load_json_file(Path::new(path))?,
        None => EstimatorConfig::default(),
    };
    run_scenario(&scenario, config)
}

fn run_scenario(scenario: &SyntheticScenario, config: EstimatorConfig) -> Result<CliReport> {
    let frames = scenario.build()?;
    let truth = *frames.source.depth_se3_world();

    let mut estimator = RelativePoseEstimator::new(config, frames.extractor);
    estimator.set_target_image(frames.target)?;
    estimator.set_source_image(frames.source)?;
    let success = estimator.estimate_new_pose()?;
    info!("estimation {}", if success { "succeeded" } else { "failed" });

    let estimated = estimator.estimated_pose();
    Ok(CliReport {
        success,
        estimated_pose: estimated.map(|p| pose_spec(p.cam_se3_world())),
        ground_truth: pose_spec(&truth),
        translation_error: estimated.map(|p| translation_distance(p.cam_se3_world(), &truth)),
        rotation_error: estimated.map(|p| rotation_angle_between(p.cam_se3_world(), &truth)),
        num_matches: estimator.num_matches(),
        report: estimator.last_report().cloned().unwrap_or_default(),
    })
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    if let Err(err) = try_main() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

fn try_main() -> Result<()> {
    let args = Args::parse();
    let report = run_from_files(args.scenario.as_deref(), args.config.as_deref())?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
