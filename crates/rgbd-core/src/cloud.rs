//! Oriented point clouds built from frames, and their subsampling.

use std::collections::BTreeMap;
use std::f64::consts::PI;

use rand::seq::SliceRandom;
use rand::{rngs::StdRng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::{Frame, Iso3, Pt2, Pt3, PreconditionError, Real, Vec3};

/// A 3D point with its unit surface normal.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OrientedPoint {
    pub point: Pt3,
    pub normal: Vec3,
}

/// Ordered sequence of oriented points, all expressed in one frame.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrientedCloud {
    pub points: Vec<OrientedPoint>,
}

impl OrientedCloud {
    pub fn new(points: Vec<OrientedPoint>) -> Self {
        Self { points }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Subset by index, preserving the given order.
    pub fn select(&self, indices: &[usize]) -> Self {
        Self {
            points: indices.iter().map(|&i| self.points[i]).collect(),
        }
    }

    /// Apply a rigid transform to points and normals.
    pub fn transformed(&self, iso: &Iso3) -> Self {
        Self {
            points: self
                .points
                .iter()
                .map(|p| OrientedPoint {
                    point: iso.transform_point(&p.point),
                    normal: iso.transform_vector(&p.normal),
                })
                .collect(),
        }
    }
}

/// Build an oriented cloud in color-camera coordinates.
///
/// Uses the frame's mapped depth and normal map, back-projected with the color
/// intrinsics. Every `stride`-th pixel along both axes is visited; pixels
/// without depth or normal are skipped.
pub fn frame_to_cloud(frame: &Frame, stride: u32) -> Result<OrientedCloud, PreconditionError> {
    let calib = frame
        .calibration()
        .ok_or(PreconditionError::MissingCalibration)?;
    let mapped = frame
        .mapped_depth()
        .ok_or(PreconditionError::MissingMappedDepth)?;
    let k = calib.color_intrinsics;
    let stride = stride.max(1);

    let (w, h) = mapped.dimensions();
    let mut points = Vec::with_capacity(((w / stride) * (h / stride)) as usize);
    for y in (0..h).step_by(stride as usize) {
        for x in (0..w).step_by(stride as usize) {
            let d = mapped.get_pixel(x, y)[0] as Real;
            if !(d.is_finite() && d > 0.0) {
                continue;
            }
            let Some(normal) = frame.normal_at(x, y) else {
                continue;
            };
            points.push(OrientedPoint {
                point: k.backproject(&Pt2::new(x as Real, y as Real), d),
                normal,
            });
        }
    }
    Ok(OrientedCloud { points })
}

/// Reduces a dense cloud to at most `n` points, deterministically.
pub trait PointCloudSampler {
    /// Indices into `cloud` of the kept points.
    fn sample_indices(&self, cloud: &OrientedCloud, n: usize) -> Vec<usize>;

    fn subsample(&self, cloud: &OrientedCloud, n: usize) -> OrientedCloud {
        cloud.select(&self.sample_indices(cloud, n))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalSamplerOptions {
    /// Bins along the polar angle of the normal.
    pub polar_bins: usize,
    /// Bins along the azimuth of the normal.
    pub azimuth_bins: usize,
    pub seed: u64,
}

impl Default for NormalSamplerOptions {
    fn default() -> Self {
        Self {
            polar_bins: 8,
            azimuth_bins: 16,
            seed: 0x5eed,
        }
    }
}

/// Normal-space sampling.
///
/// Normals are binned by spherical angles; points are drawn round-robin from
/// the bins so that rare orientations (which constrain ICP the most) survive
/// even when a flat wall dominates the cloud. Within a bin the draw order is a
/// seeded shuffle. Returned indices are ascending.
#[derive(Debug, Clone, Default)]
pub struct NormalSpaceSampler {
    pub opts: NormalSamplerOptions,
}

impl NormalSpaceSampler {
    pub fn new(opts: NormalSamplerOptions) -> Self {
        Self { opts }
    }

    fn bin_of(&self, n: &Vec3) -> (usize, usize) {
        let polar_bins = self.opts.polar_bins.max(1);
        let azimuth_bins = self.opts.azimuth_bins.max(1);
        let polar = n.z.clamp(-1.0, 1.0).acos();
        let azimuth = n.y.atan2(n.x) + PI;
        let pb = ((polar / PI) * polar_bins as Real) as usize;
        let ab = ((azimuth / (2.0 * PI)) * azimuth_bins as Real) as usize;
        (pb.min(polar_bins - 1), ab.min(azimuth_bins - 1))
    }
}

impl PointCloudSampler for NormalSpaceSampler {
    fn sample_indices(&self, cloud: &OrientedCloud, n: usize) -> Vec<usize> {
        if cloud.len() <= n {
            return (0..cloud.len()).collect();
        }

        let mut bins: BTreeMap<(usize, usize), Vec<usize>> = BTreeMap::new();
        for (i, p) in cloud.points.iter().enumerate() {
            bins.entry(self.bin_of(&p.normal)).or_default().push(i);
        }

        let mut rng = StdRng::seed_from_u64(self.opts.seed);
        let mut queues: Vec<Vec<usize>> = bins.into_values().collect();
        for q in &mut queues {
            q.shuffle(&mut rng);
            // Drawn from the back.
            q.reverse();
        }

        let mut picked = Vec::with_capacity(n);
        while picked.len() < n {
            let mut progressed = false;
            for q in &mut queues {
                if picked.len() == n {
                    break;
                }
                if let Some(i) = q.pop() {
                    picked.push(i);
                    progressed = true;
                }
            }
            if !progressed {
                break;
            }
        }

        picked.sort_unstable();
        picked
    }
}
