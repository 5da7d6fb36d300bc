//! RGBD-ICP: dense point-to-plane alignment anchored by sparse features.
//!
//! The source camera pose is refined against a target cloud in the world.
//! Each outer iteration:
//! 1. moves the (sampled) source cloud into the world with the current pose,
//! 2. pairs every source point with its nearest target point (k-d tree),
//!    rejecting pairs that are too far apart or whose normals disagree,
//! 3. solves for a 6-DoF increment with Levenberg-Marquardt over Huber-weighted
//!    point-to-plane residuals plus weighted 3D feature residuals,
//! 4. left-applies the increment: `W_{k+1} = exp(x) * W_k`, with `W` the
//!    source camera's `world_se3_cam`.
//!
//! Converged once an increment is below both tolerances.

use kiddo::{ImmutableKdTree, SquaredEuclidean};
use log::debug;
use nalgebra::{DMatrix, DVector};
use rgbd_core::{ColorPose, OrientedCloud, Pt3, Real, Vec3};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    increment_magnitude, increment_to_iso, numeric_jacobian, LmBackend, NllsProblem,
    NllsSolverBackend, RobustKernel, SolveOptions,
};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RefineError {
    #[error("only {found} dense correspondences, need {needed}")]
    NotEnoughCorrespondences { found: usize, needed: usize },
    #[error("no convergence after {iterations} iterations")]
    NotConverged { iterations: usize },
    #[error("least-squares step failed: {0}")]
    SolverFailed(String),
    #[error("{0} point cloud is empty")]
    EmptyCloud(&'static str),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IcpOptions {
    /// Outer (association) iterations.
    pub max_iterations: usize,
    /// Pairs farther apart than this (meters) are rejected.
    pub max_correspondence_distance: Real,
    /// Pairs whose normals differ by more than this (radians) are rejected.
    pub max_normal_angle: Real,
    pub min_correspondences: usize,
    pub plane_kernel: RobustKernel,
    /// Weight of each feature residual relative to a plane residual.
    pub feature_weight: Real,
    /// Convergence threshold on the increment's translation (meters).
    pub translation_tolerance: Real,
    /// Convergence threshold on the increment's rotation (radians).
    pub rotation_tolerance: Real,
    /// Inner least-squares options.
    pub solver: SolveOptions,
}

impl Default for IcpOptions {
    fn default() -> Self {
        Self {
            max_iterations: 30,
            max_correspondence_distance: 0.05,
            max_normal_angle: 0.5,
            min_correspondences: 50,
            plane_kernel: RobustKernel::Huber { delta: 0.01 },
            feature_weight: 1.0,
            translation_tolerance: 1e-4,
            rotation_tolerance: 1e-4,
            solver: SolveOptions {
                max_iters: 20,
                ..SolveOptions::default()
            },
        }
    }
}

/// Everything a dense refiner consumes.
///
/// Both clouds are in their own color-camera frames. Feature pairs are
/// zipped: `feature_target[i]` (world) matches `feature_source[i]` (source
/// color-camera frame).
#[derive(Debug, Clone, Copy)]
pub struct RefineInput<'a> {
    /// Initial source color-camera pose.
    pub seed: &'a ColorPose,
    pub target_pose: &'a ColorPose,
    pub feature_target: &'a [Pt3],
    pub feature_source: &'a [Pt3],
    pub source_cloud: &'a OrientedCloud,
    pub target_cloud: &'a OrientedCloud,
}

#[derive(Debug, Clone)]
pub struct Refinement {
    pub pose: ColorPose,
    pub iterations: usize,
    /// Dense pairs in the last association step.
    pub num_correspondences: usize,
    /// RMS point-to-plane distance of those pairs before the final step.
    pub rms: Real,
}

/// Dense refinement of a seed pose.
pub trait PoseRefiner {
    fn refine(&self, input: &RefineInput<'_>) -> Result<Refinement, RefineError>;
}

#[derive(Debug, Clone, Default)]
pub struct RgbdIcp {
    pub opts: IcpOptions,
    backend: LmBackend,
}

impl RgbdIcp {
    pub fn new(opts: IcpOptions) -> Self {
        Self {
            opts,
            backend: LmBackend,
        }
    }
}

/// Linearization point of one outer iteration, all in world coordinates.
struct AlignmentProblem {
    plane_src: Vec<Pt3>,
    plane_dst: Vec<Pt3>,
    plane_normal: Vec<Vec3>,
    feat_src: Vec<Pt3>,
    feat_dst: Vec<Pt3>,
    feature_scale: Real,
    kernel: RobustKernel,
}

impl NllsProblem for AlignmentProblem {
    fn num_params(&self) -> usize {
        6
    }

    fn num_residuals(&self) -> usize {
        self.plane_src.len() + 3 * self.feat_src.len()
    }

    fn residuals_unweighted(&self, x: &DVector<Real>) -> DVector<Real> {
        let delta = increment_to_iso(x);
        let mut r = DVector::zeros(self.num_residuals());
        for (i, ((p, q), n)) in self
            .plane_src
            .iter()
            .zip(&self.plane_dst)
            .zip(&self.plane_normal)
            .enumerate()
        {
            r[i] = n.dot(&(delta * p - q));
        }
        let base = self.plane_src.len();
        for (i, (p, q)) in self.feat_src.iter().zip(&self.feat_dst).enumerate() {
            let d = (delta * p - q) * self.feature_scale;
            r.fixed_rows_mut::<3>(base + 3 * i).copy_from(&d);
        }
        r
    }

    fn jacobian_unweighted(&self, x: &DVector<Real>) -> DMatrix<Real> {
        numeric_jacobian(
            |p| self.residuals_unweighted(p),
            x,
            self.num_residuals(),
            1e-7,
        )
    }

    fn robust_row_scales(&self, r: &DVector<Real>) -> DVector<Real> {
        let n_plane = self.plane_src.len();
        DVector::from_iterator(
            r.len(),
            r.iter().enumerate().map(|(i, ri)| {
                if i < n_plane {
                    self.kernel.row_scale(*ri)
                } else {
                    1.0
                }
            }),
        )
    }
}

impl PoseRefiner for RgbdIcp {
    fn refine(&self, input: &RefineInput<'_>) -> Result<Refinement, RefineError> {
        if input.source_cloud.is_empty() {
            return Err(RefineError::EmptyCloud("source"));
        }
        if input.target_cloud.is_empty() {
            return Err(RefineError::EmptyCloud("target"));
        }
        let opts = &self.opts;

        let target = input.target_cloud.transformed(&input.target_pose.world_se3_cam());
        // Flat walls put many points on one coordinate; the immutable tree
        // tolerates that where the bucketed mutable one does not.
        let positions: Vec<[Real; 3]> = target
            .points
            .iter()
            .map(|p| [p.point.x, p.point.y, p.point.z])
            .collect();
        let tree: ImmutableKdTree<Real, 3> = ImmutableKdTree::new_from_slice(&positions);

        let max_d2 = opts.max_correspondence_distance.powi(2);
        let min_cos = opts.max_normal_angle.cos();
        let feature_scale = opts.feature_weight.max(0.0).sqrt();
        let mut world_se3_src = input.seed.world_se3_cam();

        let n_feat = input.feature_source.len().min(input.feature_target.len());
        let feat_dst = &input.feature_target[..n_feat];

        for iter in 0..opts.max_iterations {
            let mut problem = AlignmentProblem {
                plane_src: Vec::new(),
                plane_dst: Vec::new(),
                plane_normal: Vec::new(),
                feat_src: input.feature_source[..n_feat]
                    .iter()
                    .map(|p| world_se3_src * p)
                    .collect(),
                feat_dst: feat_dst.to_vec(),
                feature_scale,
                kernel: opts.plane_kernel,
            };

            for sp in &input.source_cloud.points {
                let p = world_se3_src * sp.point;
                let n = world_se3_src.rotation * sp.normal;
                let nn = tree.nearest_one::<SquaredEuclidean>(&[p.x, p.y, p.z]);
                if nn.distance > max_d2 {
                    continue;
                }
                let tp = &target.points[nn.item as usize];
                if n.dot(&tp.normal) < min_cos {
                    continue;
                }
                problem.plane_src.push(p);
                problem.plane_dst.push(tp.point);
                problem.plane_normal.push(tp.normal);
            }

            let found = problem.plane_src.len();
            if found < opts.min_correspondences {
                return Err(RefineError::NotEnoughCorrespondences {
                    found,
                    needed: opts.min_correspondences,
                });
            }
            let rms = (problem
                .plane_src
                .iter()
                .zip(&problem.plane_dst)
                .zip(&problem.plane_normal)
                .map(|((p, q), n)| n.dot(&(p - q)).powi(2))
                .sum::<Real>()
                / found as Real)
                .sqrt();

            let (x, report) = self
                .backend
                .solve(&problem, DVector::zeros(6), &opts.solver);
            if x.iter().any(|v| !v.is_finite()) {
                return Err(RefineError::SolverFailed(format!(
                    "non-finite increment after {} evaluations",
                    report.iterations
                )));
            }

            world_se3_src = increment_to_iso(&x) * world_se3_src;
            let (dt, dr) = increment_magnitude(&x);
            debug!(
                "icp iter {iter}: {found} pairs, rms {rms:.5}, step {dt:.2e} m / {dr:.2e} rad"
            );

            if dt < opts.translation_tolerance && dr < opts.rotation_tolerance {
                return Ok(Refinement {
                    pose: input.seed.with_transform(world_se3_src.inverse()),
                    iterations: iter + 1,
                    num_correspondences: found,
                    rms,
                });
            }
        }

        Err(RefineError::NotConverged {
            iterations: opts.max_iterations,
        })
    }
}
