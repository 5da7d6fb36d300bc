//! One RGB-D capture: color, raw depth, registered depth and calibration.

use std::sync::Arc;

use image::{ImageBuffer, Luma, Rgb32FImage, RgbImage};

use crate::{Calibration, DepthPose, Iso3, PreconditionError, Real, Vec3};

/// Metric depth (meters) per pixel; `0` marks a missing measurement.
pub type DepthMap = ImageBuffer<Luma<f32>, Vec<f32>>;

/// Unit surface normals per pixel, stored as `(nx, ny, nz)`; all-zero marks
/// pixels where no normal could be estimated.
pub type NormalMap = Rgb32FImage;

/// An RGB-D frame.
///
/// `depth` lives on the depth sensor's pixel grid. `mapped_depth` is the same
/// measurement resampled onto the color grid (same size as `color`), which is
/// what keypoints sample from. `normals`, when present, is aligned with
/// `mapped_depth`.
#[derive(Debug, Clone)]
pub struct Frame {
    id: u64,
    color: RgbImage,
    depth: DepthMap,
    mapped_depth: Option<DepthMap>,
    normals: Option<NormalMap>,
    calibration: Option<Arc<Calibration>>,
    depth_se3_world: Iso3,
}

impl Frame {
    pub fn new(id: u64, color: RgbImage, depth: DepthMap) -> Self {
        Self {
            id,
            color,
            depth,
            mapped_depth: None,
            normals: None,
            calibration: None,
            depth_se3_world: Iso3::identity(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn color(&self) -> &RgbImage {
        &self.color
    }

    pub fn depth(&self) -> &DepthMap {
        &self.depth
    }

    pub fn depth_mut(&mut self) -> &mut DepthMap {
        &mut self.depth
    }

    pub fn mapped_depth(&self) -> Option<&DepthMap> {
        self.mapped_depth.as_ref()
    }

    pub fn mapped_depth_mut(&mut self) -> Option<&mut DepthMap> {
        self.mapped_depth.as_mut()
    }

    /// Attach depth registered to the color grid.
    pub fn set_mapped_depth(&mut self, mapped: DepthMap) -> Result<(), PreconditionError> {
        if mapped.dimensions() != self.color.dimensions() {
            return Err(PreconditionError::ImageSizeMismatch {
                expected: self.color.dimensions(),
                actual: mapped.dimensions(),
            });
        }
        self.mapped_depth = Some(mapped);
        self.normals = None;
        Ok(())
    }

    pub fn normals(&self) -> Option<&NormalMap> {
        self.normals.as_ref()
    }

    pub fn set_normals(&mut self, normals: NormalMap) -> Result<(), PreconditionError> {
        if normals.dimensions() != self.color.dimensions() {
            return Err(PreconditionError::ImageSizeMismatch {
                expected: self.color.dimensions(),
                actual: normals.dimensions(),
            });
        }
        self.normals = Some(normals);
        Ok(())
    }

    pub fn calibration(&self) -> Option<&Calibration> {
        self.calibration.as_deref()
    }

    /// Attach the sensor calibration. Fails if one is already attached.
    pub fn attach_calibration(
        &mut self,
        calibration: Arc<Calibration>,
    ) -> Result<(), PreconditionError> {
        if self.calibration.is_some() {
            return Err(PreconditionError::CalibrationAlreadyAttached);
        }
        self.calibration = Some(calibration);
        Ok(())
    }

    pub fn with_calibration(mut self, calibration: Arc<Calibration>) -> Self {
        self.calibration = Some(calibration);
        self
    }

    pub fn depth_se3_world(&self) -> &Iso3 {
        &self.depth_se3_world
    }

    pub fn set_depth_se3_world(&mut self, pose: Iso3) {
        self.depth_se3_world = pose;
    }

    /// The frame's own depth-camera pose. `None` until calibrated.
    pub fn depth_pose(&self) -> Option<DepthPose> {
        self.calibration()
            .map(|c| DepthPose::new(self.depth_se3_world, c.depth_intrinsics))
    }

    /// Mapped depth at the pixel nearest to `(u, v)`; `None` if outside the
    /// image, not mapped, or not measured.
    pub fn mapped_depth_at(&self, u: Real, v: Real) -> Option<Real> {
        let mapped = self.mapped_depth.as_ref()?;
        sample_depth(mapped, u, v)
    }

    /// Normal at integer pixel `(x, y)` if one was estimated there.
    pub fn normal_at(&self, x: u32, y: u32) -> Option<Vec3> {
        let normals = self.normals.as_ref()?;
        let px = normals.get_pixel_checked(x, y)?;
        let n = Vec3::new(px[0] as Real, px[1] as Real, px[2] as Real);
        (n.norm_squared() > 0.5).then_some(n)
    }
}

/// Nearest-pixel depth lookup; `None` when out of bounds or non-positive.
pub fn sample_depth(depth: &DepthMap, u: Real, v: Real) -> Option<Real> {
    let (x, y) = (u.round(), v.round());
    if x < 0.0 || y < 0.0 {
        return None;
    }
    let px = depth.get_pixel_checked(x as u32, y as u32)?;
    let d = px[0] as Real;
    (d.is_finite() && d > 0.0).then_some(d)
}
