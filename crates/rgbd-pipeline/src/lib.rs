//! Relative pose estimation between two calibrated RGB-D frames.
//!
//! [`RelativePoseEstimator`] drives feature extraction, matching, the robust
//! rigid solve and optional dense refinement. Its collaborators are
//! swappable trait objects; by default it uses [`rgbd_core::BruteForceMatcher`],
//! [`rgbd_linear::RansacRigidSolver`], [`rgbd_core::DepthProcessor`],
//! [`rgbd_core::NormalSpaceSampler`] and [`rgbd_optim::RgbdIcp`], all built
//! from one [`EstimatorConfig`].

mod config;
mod dense;
mod estimator;
mod report;

pub use config::*;
pub use estimator::*;
pub use report::*;
