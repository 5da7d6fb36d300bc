//! Closed-form and robust rigid pose estimation.
//!
//! - [`rigid_fit`]: least-squares rigid alignment of two 3D point sets (Kabsch).
//! - [`RobustPoseSolver`]: the contract for outlier-tolerant pose solvers
//!   working on target 3D points and `(u, v, depth)` observations.
//! - [`RansacRigidSolver`]: Kabsch inside the core RANSAC engine.

mod rigid;
mod solver;

pub use rigid::*;
pub use solver::*;
