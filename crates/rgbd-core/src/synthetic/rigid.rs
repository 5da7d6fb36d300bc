//! Synthetic 3D-to-observation correspondences for rigid pose solvers.
//!
//! Target points are world-space 3D points; observations are `(u, v, depth)`
//! as seen by a camera at a known `cam_se3_world`, optionally perturbed and
//! optionally replaced by gross outliers.

use super::noise::{unit, GaussianNoise, UniformNoise};
use crate::{FxFyCxCySkew, Iso3, Pt3, Real, Vec3};

#[derive(Debug, Clone, PartialEq)]
pub struct RigidCorrespondenceOptions {
    pub num_points: usize,
    /// Every `outlier_every`-th pair (starting at index 1) becomes an outlier; 0 disables.
    pub outlier_every: usize,
    pub pixel_noise: GaussianNoise,
    /// Uniform per-axis pixel noise, added on top of the Gaussian part.
    pub pixel_uniform: UniformNoise,
    pub depth_noise: GaussianNoise,
    pub seed: u64,
}

impl Default for RigidCorrespondenceOptions {
    fn default() -> Self {
        Self {
            num_points: 30,
            outlier_every: 0,
            pixel_noise: GaussianNoise::default(),
            pixel_uniform: UniformNoise::default(),
            depth_noise: GaussianNoise::default(),
            seed: 99,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RigidCorrespondences {
    pub target: Vec<Pt3>,
    /// `(u, v, depth)` in the observing camera.
    pub observations: Vec<Vec3>,
    pub is_outlier: Vec<bool>,
}

const POINT_STREAM: u64 = 0x9017;
const OUTLIER_STREAM: u64 = 0x0B57;

/// Generate correspondences observed by `cam_se3_world` through `k`.
///
/// World points are spread in a box that projects inside a `2 cx` by `2 cy`
/// image at depths between 1.5 m and 3 m.
pub fn rigid_correspondences(
    cam_se3_world: &Iso3,
    k: &FxFyCxCySkew<Real>,
    opts: &RigidCorrespondenceOptions,
) -> RigidCorrespondences {
    let world_se3_cam = cam_se3_world.inverse();
    let mut out = RigidCorrespondences::default();

    for i in 0..opts.num_points {
        let idx = i as u64;
        let z = 1.5 + 1.5 * unit(opts.seed, POINT_STREAM, idx, 2);
        let u = 0.1 * k.cx + 1.8 * k.cx * unit(opts.seed, POINT_STREAM, idx, 0);
        let v = 0.1 * k.cy + 1.8 * k.cy * unit(opts.seed, POINT_STREAM, idx, 1);
        let p_c = k.backproject(&crate::Pt2::new(u, v), z);
        out.target.push(world_se3_cam.transform_point(&p_c));

        let outlier = opts.outlier_every > 0 && i % opts.outlier_every == 1;
        let obs = if outlier {
            // Displaced by 20 to 40 pixels.
            let angle = 2.0 * std::f64::consts::PI * unit(opts.seed, OUTLIER_STREAM, idx, 0);
            let radius = 20.0 + 20.0 * unit(opts.seed, OUTLIER_STREAM, idx, 1);
            Vec3::new(
                u + radius * angle.cos(),
                v + radius * angle.sin(),
                z * (0.7 + 0.6 * unit(opts.seed, OUTLIER_STREAM, idx, 2)),
            )
        } else {
            Vec3::new(
                u + opts.pixel_noise.sample(0, idx, 0) + opts.pixel_uniform.sample(0, idx, 0),
                v + opts.pixel_noise.sample(0, idx, 1) + opts.pixel_uniform.sample(0, idx, 1),
                z + opts.depth_noise.sample(0, idx, 2),
            )
        };
        out.observations.push(obs);
        out.is_outlier.push(outlier);
    }
    out
}
