//! Least-squares rigid alignment of corresponding 3D points.

use nalgebra::{Matrix3, Rotation3, Translation3, UnitQuaternion};
use rgbd_core::{Iso3, Pt3, Real, Vec3};

/// Rigid transform `T` minimizing `sum |dst_i - T * src_i|^2` (Kabsch).
///
/// Needs at least three non-collinear pairs; returns `None` for fewer
/// points, mismatched lengths or a rank-deficient cross-covariance.
pub fn rigid_fit(src: &[Pt3], dst: &[Pt3]) -> Option<Iso3> {
    let n = src.len();
    if n < 3 || dst.len() != n {
        return None;
    }

    let inv_n = 1.0 / n as Real;
    let c_src = src.iter().fold(Vec3::zeros(), |acc, p| acc + p.coords) * inv_n;
    let c_dst = dst.iter().fold(Vec3::zeros(), |acc, p| acc + p.coords) * inv_n;

    let mut h = Matrix3::<Real>::zeros();
    for (s, d) in src.iter().zip(dst) {
        h += (s.coords - c_src) * (d.coords - c_dst).transpose();
    }

    let svd = h.svd(true, true);
    let sv = svd.singular_values;
    let mut sorted = [sv[0], sv[1], sv[2]];
    sorted.sort_by(|a, b| b.total_cmp(a));
    if sorted[1] <= 1e-12 * sorted[0].max(1.0) {
        return None;
    }
    let u = svd.u?;
    let v_t = svd.v_t?;

    // Reflection guard: flip the axis of the smallest singular value.
    let mut v = v_t.transpose();
    if (v * u.transpose()).determinant() < 0.0 {
        v.column_mut(sv.imin()).neg_mut();
    }
    let r = v * u.transpose();

    let rot = UnitQuaternion::from_rotation_matrix(&Rotation3::from_matrix_unchecked(r));
    let t = c_dst - rot * c_src;
    Some(Iso3::from_parts(Translation3::from(t), rot))
}
