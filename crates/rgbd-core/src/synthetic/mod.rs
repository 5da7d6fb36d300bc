//! Deterministic synthetic data generation helpers.
//!
//! Building blocks for RGB-D tracking problems used in tests, examples and
//! the command line tool:
//! - a height-field scene rendered into calibrated frames ([`scene`]),
//! - a landmark "detector" implementing [`crate::FeatureExtractor`],
//! - serializable two-frame scenarios ([`scenario`]),
//! - rigid 3D-to-observation correspondences with outliers ([`rigid`]),
//! - keyed pseudo-random noise ([`noise`]).
//!
//! Everything is seeded explicitly; nothing reads from `thread_rng`.
//!
//! # Example
//!
//! ```no_run
//! use rgbd_core::synthetic::scenario::SyntheticScenario;
//!
//! let frames = SyntheticScenario::default().build().unwrap();
//! assert!(frames.source.mapped_depth().is_some());
//! ```

pub mod noise;
pub mod rigid;
pub mod scenario;
pub mod scene;
