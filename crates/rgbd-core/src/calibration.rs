//! RGB-D sensor calibration: two pinhole cameras and the rigid offset between them.

use serde::{Deserialize, Serialize};

use crate::{iso_from_rt, FxFyCxCySkew, Iso3, Mat3, Real, Vec3};

/// Intrinsics of both sensors and the depth-to-color extrinsics.
///
/// The extrinsic maps depth-camera coordinates into color-camera coordinates:
///
/// ```text
/// p_color = R * p_depth + T
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Calibration {
    pub color_intrinsics: FxFyCxCySkew<Real>,
    pub depth_intrinsics: FxFyCxCySkew<Real>,
    pub r: Mat3,
    pub t: Vec3,
}

impl Calibration {
    /// `T_C_D`: depth camera to color camera.
    pub fn color_se3_depth(&self) -> Iso3 {
        iso_from_rt(&self.r, &self.t)
    }
}
