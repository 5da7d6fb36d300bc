//! Outlier-tolerant rigid pose from 3D points and depth-augmented pixels.
//!
//! The target side is a set of world-space points. The source side is a set
//! of raw `(u, v, depth)` observations on the color image of the camera being
//! solved for; they are lifted to 3D with the seed pose's intrinsics inside
//! the solver.

use log::debug;
use rgbd_core::{
    ransac_fit, ColorPose, Estimator, FxFyCxCySkew, IntrinsicsModel, Iso3, Pt2, Pt3,
    RansacOptions, RansacResult, Real, Vec3,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::rigid_fit;

/// Minimal triangle area (m^2) of a RANSAC sample in target space.
const MIN_SAMPLE_AREA: Real = 1e-6;

#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SolveError {
    #[error("need at least {needed} correspondences, got {got}")]
    NotEnoughPairs { needed: usize, got: usize },
    #[error("{target} target points but {observations} observations")]
    LengthMismatch { target: usize, observations: usize },
    #[error("no pose hypothesis reached consensus")]
    NoConsensus,
}

/// Output of a robust solve.
#[derive(Debug, Clone)]
pub struct RobustSolve {
    /// Pose of the observing color camera, `cam_se3_world`.
    pub pose: ColorPose,
    /// Per-pair inlier flags, parallel to the input.
    pub inliers: Vec<bool>,
    /// Sum of the inlier residuals, in meters.
    pub error: Real,
}

impl RobustSolve {
    pub fn num_inliers(&self) -> usize {
        self.inliers.iter().filter(|&&b| b).count()
    }
}

/// Robust rigid pose from 3D-to-observation pairs.
pub trait RobustPoseSolver {
    /// Estimate the pose of the camera that made `observations`.
    ///
    /// `target[i]` and `observations[i]` (`(u, v, depth)`) describe the same
    /// physical point. With `use_depth` the residual is the full 3D distance;
    /// otherwise only its component orthogonal to the viewing ray counts.
    fn solve(
        &self,
        seed: &ColorPose,
        target: &[Pt3],
        observations: &[Vec3],
        use_depth: bool,
    ) -> Result<RobustSolve, SolveError>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RigidRansacOptions {
    #[serde(flatten)]
    pub ransac: RansacOptions,
    /// Also score the seed pose itself as a hypothesis.
    pub try_seed: bool,
}

impl Default for RigidRansacOptions {
    fn default() -> Self {
        Self {
            ransac: RansacOptions::default(),
            try_seed: true,
        }
    }
}

/// Kabsch hypotheses from three pairs, scored by metric residual.
#[derive(Debug, Clone, Default)]
pub struct RansacRigidSolver {
    pub opts: RigidRansacOptions,
}

impl RansacRigidSolver {
    pub fn new(opts: RigidRansacOptions) -> Self {
        Self { opts }
    }
}

#[derive(Debug, Clone)]
struct RigidDatum {
    target: Pt3,
    /// Observation lifted into the camera frame.
    observed: Pt3,
    /// Observation on the normalized image plane.
    ray: Pt2,
    depth: Real,
    use_depth: bool,
}

impl RigidDatum {
    fn new(target: Pt3, obs: &Vec3, k: &FxFyCxCySkew<Real>, use_depth: bool) -> Self {
        let ray = k.pixel_to_sensor(&Pt2::new(obs.x, obs.y));
        Self {
            target,
            observed: Pt3::new(ray.x * obs.z, ray.y * obs.z, obs.z),
            ray,
            depth: obs.z,
            use_depth,
        }
    }
}

struct RigidEst;

impl Estimator for RigidEst {
    type Datum = RigidDatum;
    type Model = Iso3;

    const MIN_SAMPLES: usize = 3;

    fn fit(data: &[Self::Datum], sample_indices: &[usize]) -> Option<Self::Model> {
        Self::refit(data, sample_indices)
    }

    fn residual(model: &Self::Model, datum: &Self::Datum) -> f64 {
        let p = model.transform_point(&datum.target);
        if datum.use_depth {
            return (p - datum.observed).norm();
        }
        if p.z <= 0.0 {
            return f64::INFINITY;
        }
        let dx = p.x / p.z - datum.ray.x;
        let dy = p.y / p.z - datum.ray.y;
        (dx * dx + dy * dy).sqrt() * datum.depth
    }

    fn is_degenerate(data: &[Self::Datum], sample_indices: &[usize]) -> bool {
        let [a, b, c] = [0, 1, 2].map(|i| data[sample_indices[i]].target);
        0.5 * (b - a).cross(&(c - a)).norm() < MIN_SAMPLE_AREA
    }

    fn refit(data: &[Self::Datum], inliers: &[usize]) -> Option<Self::Model> {
        let src: Vec<Pt3> = inliers.iter().map(|&i| data[i].target).collect();
        let dst: Vec<Pt3> = inliers.iter().map(|&i| data[i].observed).collect();
        rigid_fit(&src, &dst)
    }
}

/// Consensus of a fixed model, refit once on its inliers.
fn score_fixed(data: &[RigidDatum], model: Iso3, opts: &RansacOptions) -> RansacResult<Iso3> {
    let consensus = |m: &Iso3| -> (Vec<usize>, Vec<f64>) {
        data.iter()
            .enumerate()
            .filter_map(|(i, d)| {
                let r = RigidEst::residual(m, d);
                (r <= opts.thresh).then_some((i, r))
            })
            .unzip()
    };

    let (mut inliers, mut residuals) = consensus(&model);
    let mut model = model;
    if opts.refit_on_inliers && inliers.len() >= RigidEst::MIN_SAMPLES {
        if let Some(refit) = RigidEst::refit(data, &inliers) {
            model = refit;
            (inliers, residuals) = consensus(&model);
        }
    }

    let success = inliers.len() >= opts.min_inliers.max(RigidEst::MIN_SAMPLES);
    let rms = if residuals.is_empty() {
        f64::INFINITY
    } else {
        (residuals.iter().map(|r| r * r).sum::<f64>() / residuals.len() as f64).sqrt()
    };
    RansacResult {
        success,
        model: success.then_some(model),
        inliers,
        inlier_residuals: residuals,
        inlier_rms: rms,
        iters: 0,
    }
}

impl RobustPoseSolver for RansacRigidSolver {
    fn solve(
        &self,
        seed: &ColorPose,
        target: &[Pt3],
        observations: &[Vec3],
        use_depth: bool,
    ) -> Result<RobustSolve, SolveError> {
        if target.len() != observations.len() {
            return Err(SolveError::LengthMismatch {
                target: target.len(),
                observations: observations.len(),
            });
        }
        let needed = RigidEst::MIN_SAMPLES.max(self.opts.ransac.min_inliers);
        if target.len() < needed {
            return Err(SolveError::NotEnoughPairs {
                needed,
                got: target.len(),
            });
        }

        let k = seed.intrinsics();
        let data: Vec<RigidDatum> = target
            .iter()
            .zip(observations)
            .map(|(p, o)| RigidDatum::new(*p, o, k, use_depth))
            .collect();

        let mut best = ransac_fit::<RigidEst>(&data, &self.opts.ransac);
        debug!(
            "rigid ransac: {} hypotheses, {}/{} inliers, rms {:.4}",
            best.iters,
            best.inliers.len(),
            data.len(),
            best.inlier_rms
        );

        if self.opts.try_seed {
            let from_seed = score_fixed(&data, *seed.cam_se3_world(), &self.opts.ransac);
            let seed_wins = from_seed.success
                && (!best.success
                    || from_seed.inliers.len() > best.inliers.len()
                    || (from_seed.inliers.len() == best.inliers.len()
                        && from_seed.inlier_rms < best.inlier_rms));
            if seed_wins {
                debug!("seed pose wins with {} inliers", from_seed.inliers.len());
                best = from_seed;
            }
        }

        let model = match best.model {
            Some(m) if best.success => m,
            _ => return Err(SolveError::NoConsensus),
        };

        Ok(RobustSolve {
            pose: seed.with_transform(model),
            inliers: best.inlier_mask(data.len()),
            error: best.inlier_residual_sum(),
        })
    }
}
