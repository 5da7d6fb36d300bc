use rgbd_core::Real;
use rgbd_linear::SolveError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Where a [`crate::RelativePoseEstimator`] stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EstimatorState {
    NoTarget,
    TargetSet,
    PoseEstimated,
}

/// Data-dependent reasons an estimate was not produced.
///
/// These are expected while tracking: the caller skips the frame and carries
/// on with the next one.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EstimationFailure {
    #[error("feature extraction failed: {reason}")]
    Extraction { reason: String },
    #[error("{found} descriptor matches, need {needed}")]
    NotEnoughMatches { found: usize, needed: usize },
    #[error("{found} matches with depth, need {needed}")]
    NotEnoughDepthPairs { found: usize, needed: usize },
    #[error("robust solve failed: {source}")]
    SolverFailed {
        #[from]
        source: SolveError,
    },
    #[error("normalized residual {residual:.5} exceeds {max}")]
    ResidualTooLarge { residual: Real, max: Real },
}

/// Outcome of the optional dense refinement stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RefinementStatus {
    /// Not enabled, or never reached.
    #[default]
    Skipped,
    Refined {
        iterations: usize,
        num_correspondences: usize,
        rms: Real,
    },
    /// The refiner gave up; the robust-solver pose was kept.
    Failed { reason: String },
}

impl RefinementStatus {
    /// Set when refinement ran and failed. The estimate is still returned but
    /// comes from the robust solve alone.
    pub fn is_degraded(&self) -> bool {
        matches!(self, RefinementStatus::Failed { .. })
    }
}

/// Diagnostics of one `estimate_new_pose` call.
///
/// Counters are filled as far as the call got.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EstimationReport {
    pub num_matches: usize,
    pub num_depth_pairs: usize,
    pub num_inliers: usize,
    pub normalized_residual: Option<Real>,
    pub refinement: RefinementStatus,
    pub failure: Option<EstimationFailure>,
}

impl EstimationReport {
    pub fn succeeded(&self) -> bool {
        self.failure.is_none()
    }
}
