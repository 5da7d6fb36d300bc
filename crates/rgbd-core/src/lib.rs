//! Core math and data primitives for `rgbd-odometry`.
//!
//! This crate provides the building blocks used by all other crates in the
//! workspace:
//!
//! - linear algebra type aliases (`Real`, `Vec3`, `Pt3`, `Iso3`, ...),
//! - pinhole intrinsics and the two-sensor RGB-D [`Calibration`],
//! - camera poses tagged with the sensor they belong to ([`DepthPose`],
//!   [`ColorPose`]),
//! - calibrated [`Frame`]s with raw and registered depth,
//! - keypoint sets and descriptor matching,
//! - oriented point clouds, normal-space sampling and depth filtering,
//! - a deterministic, model-agnostic RANSAC engine.
//!
//! Poses use the `cam_se3_world` convention: they map world points into the
//! camera, `p_cam = T * p_world`.
//!
//! # Example
//!
//! ```no_run
//! use rgbd_core::{DepthPose, Iso3};
//! use rgbd_core::synthetic::scene::default_calibration;
//!
//! let calib = default_calibration();
//! let depth = DepthPose::new(Iso3::identity(), calib.depth_intrinsics);
//! let color = depth.to_color_camera_with(&calib);
//! let back = color.to_depth_camera_with(&calib);
//! assert!((back.translation() - depth.translation()).norm() < 1e-12);
//! ```

mod calibration;
/// Oriented point clouds and samplers.
mod cloud;
mod error;
/// Keypoints, feature sets and descriptor matching.
mod features;
mod frame;
/// Linear algebra type aliases and helpers.
mod math;
/// Camera intrinsics.
mod models;
mod pose;
/// Depth smoothing and normal estimation.
mod processing;
/// Generic RANSAC engine and traits.
mod ransac;
/// Deterministic synthetic data generation helpers.
///
/// Public so that tests, examples and tools across the workspace can build
/// reproducible scenes; not intended for production use.
pub mod synthetic;

pub use calibration::*;
pub use cloud::*;
pub use error::*;
pub use features::*;
pub use frame::*;
pub use math::*;
pub use models::*;
pub use pose::*;
pub use processing::*;
pub use ransac::*;
