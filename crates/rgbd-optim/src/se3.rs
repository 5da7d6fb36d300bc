//! Six-vector pose increments.

use nalgebra::DVector;
use rgbd_core::{Iso3, Real, Vec3};

/// `[tx, ty, tz, rx, ry, rz]` to a rigid transform; the rotation part is a
/// rotation vector (axis times angle).
pub fn increment_to_iso(x: &DVector<Real>) -> Iso3 {
    debug_assert_eq!(x.len(), 6);
    Iso3::new(Vec3::new(x[0], x[1], x[2]), Vec3::new(x[3], x[4], x[5]))
}

/// `(translation norm, rotation angle)` of an increment.
pub fn increment_magnitude(x: &DVector<Real>) -> (Real, Real) {
    (
        Vec3::new(x[0], x[1], x[2]).norm(),
        Vec3::new(x[3], x[4], x[5]).norm(),
    )
}
