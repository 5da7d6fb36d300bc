//! Non-linear optimization for RGB-D tracking.
//!
//! The least-squares layer ([`NllsProblem`], [`LmBackend`], [`RobustKernel`])
//! is generic; [`RgbdIcp`] builds on it to refine a camera pose against dense
//! oriented point clouds plus a handful of sparse feature correspondences.

mod backend_lm;
mod icp;
mod robust;
mod se3;
mod traits;

pub use backend_lm::*;
pub use icp::*;
pub use robust::*;
pub use se3::*;
pub use traits::*;
