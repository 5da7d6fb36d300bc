use rgbd_core::{BilateralOptions, FeatureParams, NormalSamplerOptions, Real, DEFAULT_MATCH_RATIO_SQ};
use rgbd_linear::RigidRansacOptions;
use rgbd_optim::IcpOptions;
use serde::{Deserialize, Serialize};

/// Knobs of the relative pose estimator.
///
/// Every field has a default, so a JSON config only needs to list what it
/// changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EstimatorConfig {
    /// Fewer raw descriptor matches than this fail the estimate.
    pub min_matches: usize,
    /// Squared nearest/second-nearest descriptor distance ratio.
    pub match_ratio_sq: Real,
    /// Fewer matches with a source depth than this fail the estimate.
    pub min_depth_pairs: usize,
    /// Upper bound on the solver residual divided by the number of pairs.
    pub max_normalized_residual: Real,
    /// Score pairs by full 3D distance instead of lateral distance.
    pub use_depth_residual: bool,
    pub features: FeatureParams,
    pub ransac: RigidRansacOptions,
    pub refinement: RefinementConfig,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            min_matches: 10,
            match_ratio_sq: DEFAULT_MATCH_RATIO_SQ,
            min_depth_pairs: 10,
            max_normalized_residual: 0.005,
            use_depth_residual: false,
            features: FeatureParams::default(),
            ransac: RigidRansacOptions::default(),
            refinement: RefinementConfig::default(),
        }
    }
}

/// Dense refinement stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RefinementConfig {
    pub enabled: bool,
    /// Points kept from the source cloud; the target cloud stays dense.
    pub source_samples: usize,
    /// Pixel stride used when building both clouds.
    pub cloud_stride: u32,
    pub sampler: NormalSamplerOptions,
    pub smoothing: BilateralOptions,
    pub icp: IcpOptions,
}

impl Default for RefinementConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            source_samples: 1000,
            cloud_stride: 1,
            sampler: NormalSamplerOptions::default(),
            smoothing: BilateralOptions::default(),
            icp: IcpOptions::default(),
        }
    }
}
