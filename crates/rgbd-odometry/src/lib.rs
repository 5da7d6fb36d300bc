//! Frame-to-frame pose tracking for RGB-D cameras.
//!
//! Given a target frame with a known pose and a new source frame, the
//! [`RelativePoseEstimator`] computes the source frame's depth-camera pose:
//! descriptor matches are lifted to 3D, a RANSAC rigid solve rejects bad
//! pairs, and an optional RGBD-ICP pass refines the result on dense oriented
//! point clouds.
//!
//! # Quick Start
//!
//! ```no_run
//! # fn main() -> anyhow::Result<()> {
//! use rgbd_odometry::prelude::*;
//! use rgbd_odometry::synthetic::scenario::SyntheticScenario;
//!
//! let frames = SyntheticScenario::default().build()?;
//! let mut estimator = RelativePoseEstimator::new(EstimatorConfig::default(), frames.extractor);
//! estimator.set_target_image(frames.target)?;
//! estimator.set_source_image(frames.source)?;
//!
//! if estimator.estimate_new_pose()? {
//!     let pose = estimator.estimated_pose().unwrap();
//!     println!("source depth camera: {:?}", pose);
//! } else {
//!     println!("skipped: {:?}", estimator.last_report());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Module Organization
//!
//! - [`core`] - math types, poses, frames, features, clouds, RANSAC engine
//! - [`linear`] - Kabsch alignment and the robust rigid solver
//! - [`optim`] - least squares backend and the RGBD-ICP refiner
//! - [`pipeline`] - the estimator, its configuration and reports
//! - [`synthetic`] - deterministic scenes for tests and demos

// ═══════════════════════════════════════════════════════════════════════════════
// Layers
// ═══════════════════════════════════════════════════════════════════════════════

/// Math types, frame-tagged poses, frames, features and point clouds.
///
/// Re-exports everything from `rgbd_core`.
pub mod core {
    pub use rgbd_core::*;
}

/// Closed-form rigid alignment and robust pose solving.
///
/// Re-exports everything from `rgbd_linear`.
pub mod linear {
    pub use rgbd_linear::*;
}

/// Non-linear least squares and dense pose refinement.
///
/// Re-exports everything from `rgbd_optim`.
pub mod optim {
    pub use rgbd_optim::*;
}

/// The relative pose estimator.
pub mod pipeline {
    pub use rgbd_pipeline::*;
}

/// Deterministic synthetic RGB-D scenes.
pub mod synthetic {
    pub use rgbd_core::synthetic::*;
}

// ═══════════════════════════════════════════════════════════════════════════════
// Convenience Re-exports (Top-Level)
// ═══════════════════════════════════════════════════════════════════════════════

pub use rgbd_pipeline::{
    EstimationFailure, EstimationReport, EstimatorConfig, EstimatorState, RefinementConfig,
    RefinementStatus, RelativePoseEstimator,
};

pub use rgbd_core::{
    Calibration, ColorPose, DepthPose, FeatureExtractor, FeatureMatcher, FeatureParams,
    FeatureSet, Frame, FrameProcessor, FxFyCxCySkew, Iso3, PointCloudSampler, PreconditionError,
    Pt3, Real, Vec3,
};
pub use rgbd_linear::{RobustPoseSolver, SolveError};
pub use rgbd_optim::{PoseRefiner, RefineError};

// ═══════════════════════════════════════════════════════════════════════════════
// Prelude
// ═══════════════════════════════════════════════════════════════════════════════

/// Common imports for tracking code.
///
/// ```no_run
/// use rgbd_odometry::prelude::*;
/// ```
pub mod prelude {
    pub use rgbd_core::{
        Calibration, ColorPose, DepthPose, FeatureExtractor, FeatureParams, FeatureSet, Frame,
        FxFyCxCySkew, Iso3, Pt3, Real, Vec3,
    };
    pub use rgbd_pipeline::{
        EstimationReport, EstimatorConfig, EstimatorState, RefinementStatus,
        RelativePoseEstimator,
    };
}
