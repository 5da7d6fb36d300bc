//! In-place depth smoothing and normal estimation on frames.

use image::Rgb;
use serde::{Deserialize, Serialize};

use crate::{DepthMap, Frame, NormalMap, PreconditionError, Pt2, Real, Vec3};

/// Filters applied to a frame before it is turned into a point cloud.
pub trait FrameProcessor {
    /// Edge-preserving smoothing of the raw and mapped depth.
    fn bilateral_filter(&self, frame: &mut Frame);

    /// Fill the frame's normal map from its mapped depth.
    fn compute_normals(&self, frame: &mut Frame) -> Result<(), PreconditionError>;

    /// Smooth, then estimate normals.
    fn process(&self, frame: &mut Frame) -> Result<(), PreconditionError> {
        self.bilateral_filter(frame);
        self.compute_normals(frame)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BilateralOptions {
    /// Half window size in pixels.
    pub radius: u32,
    /// Spatial Gaussian sigma in pixels.
    pub sigma_space: Real,
    /// Range Gaussian sigma in meters.
    pub sigma_depth: Real,
    /// Neighbours whose depth differs by more than this fraction of the
    /// center depth do not contribute to its normal.
    pub max_normal_depth_jump: Real,
}

impl Default for BilateralOptions {
    fn default() -> Self {
        Self {
            radius: 2,
            sigma_space: 1.5,
            sigma_depth: 0.03,
            max_normal_depth_jump: 0.05,
        }
    }
}

/// Bilateral smoothing plus central-difference normals.
#[derive(Debug, Clone, Default)]
pub struct DepthProcessor {
    pub opts: BilateralOptions,
}

impl DepthProcessor {
    pub fn new(opts: BilateralOptions) -> Self {
        Self { opts }
    }
}

impl FrameProcessor for DepthProcessor {
    fn bilateral_filter(&self, frame: &mut Frame) {
        let smoothed = bilateral(frame.depth(), &self.opts);
        *frame.depth_mut() = smoothed;
        if let Some(mapped) = frame.mapped_depth_mut() {
            *mapped = bilateral(mapped, &self.opts);
        }
    }

    fn compute_normals(&self, frame: &mut Frame) -> Result<(), PreconditionError> {
        let calib = frame
            .calibration()
            .ok_or(PreconditionError::MissingCalibration)?;
        let mapped = frame
            .mapped_depth()
            .ok_or(PreconditionError::MissingMappedDepth)?;
        let normals = estimate_normals(mapped, calib, self.opts.max_normal_depth_jump);
        frame.set_normals(normals)
    }
}

/// Bilateral filter over valid depth; missing pixels stay missing.
pub fn bilateral(depth: &DepthMap, opts: &BilateralOptions) -> DepthMap {
    let (w, h) = depth.dimensions();
    let r = opts.radius as i64;
    let inv_2ss = 1.0 / (2.0 * opts.sigma_space * opts.sigma_space);
    let inv_2sd = 1.0 / (2.0 * opts.sigma_depth * opts.sigma_depth);

    DepthMap::from_fn(w, h, |x, y| {
        let d0 = depth.get_pixel(x, y)[0] as Real;
        if !(d0.is_finite() && d0 > 0.0) {
            return image::Luma([0.0]);
        }

        let (mut acc, mut wsum) = (0.0, 0.0);
        for dy in -r..=r {
            for dx in -r..=r {
                let (nx, ny) = (x as i64 + dx, y as i64 + dy);
                if nx < 0 || ny < 0 || nx >= w as i64 || ny >= h as i64 {
                    continue;
                }
                let d = depth.get_pixel(nx as u32, ny as u32)[0] as Real;
                if !(d.is_finite() && d > 0.0) {
                    continue;
                }
                let ds = (dx * dx + dy * dy) as Real;
                let dd = d - d0;
                let wgt = (-ds * inv_2ss - dd * dd * inv_2sd).exp();
                acc += wgt * d;
                wsum += wgt;
            }
        }
        image::Luma([(acc / wsum) as f32])
    })
}

fn estimate_normals(
    mapped: &DepthMap,
    calib: &crate::Calibration,
    max_jump: Real,
) -> NormalMap {
    let (w, h) = mapped.dimensions();
    let k = calib.color_intrinsics;

    let point_at = |x: u32, y: u32, center: Real| {
        let d = mapped.get_pixel(x, y)[0] as Real;
        if !(d.is_finite() && d > 0.0) || (d - center).abs() > max_jump * center {
            return None;
        }
        Some(k.backproject(&Pt2::new(x as Real, y as Real), d))
    };

    NormalMap::from_fn(w, h, |x, y| {
        let zero = Rgb([0.0, 0.0, 0.0]);
        if x == 0 || y == 0 || x + 1 >= w || y + 1 >= h {
            return zero;
        }
        let d0 = mapped.get_pixel(x, y)[0] as Real;
        if !(d0.is_finite() && d0 > 0.0) {
            return zero;
        }
        let (Some(l), Some(r), Some(u), Some(b)) = (
            point_at(x - 1, y, d0),
            point_at(x + 1, y, d0),
            point_at(x, y - 1, d0),
            point_at(x, y + 1, d0),
        ) else {
            return zero;
        };

        let n: Vec3 = (r - l).cross(&(b - u));
        let norm = n.norm();
        if norm < 1e-12 {
            return zero;
        }
        let mut n = n / norm;
        let p = k.backproject(&Pt2::new(x as Real, y as Real), d0);
        // Face the camera.
        if n.dot(&p.coords) > 0.0 {
            n = -n;
        }
        Rgb([n.x as f32, n.y as f32, n.z as f32])
    })
}
