//! Contract violations shared by every stage of the pose pipeline.

use thiserror::Error;

/// A broken caller contract.
///
/// These are never data-dependent: they mean a frame was handed over without
/// the information the pipeline needs, or an upstream stage produced
/// something it promised not to. Callers should treat them as bugs rather
/// than skipping the frame.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PreconditionError {
    #[error("frame must be calibrated")]
    MissingCalibration,
    #[error("frame calibration is immutable once attached")]
    CalibrationAlreadyAttached,
    #[error("set_target_image must be called before estimating a pose")]
    MissingTargetFrame,
    #[error("set_source_image must be called before estimating a pose")]
    MissingSourceFrame,
    #[error("no valid target pose")]
    MissingTargetPose,
    #[error("frame must have a depth map registered to the color image")]
    MissingMappedDepth,
    #[error("match uses target feature {target_idx} which has no depth")]
    TargetPointWithoutDepth { target_idx: usize },
    #[error("image size mismatch: expected {expected:?}, got {actual:?}")]
    ImageSizeMismatch {
        expected: (u32, u32),
        actual: (u32, u32),
    },
}
