use nalgebra::{
    Isometry3, Matrix3, Point2, Point3, Rotation3, Translation3, UnitQuaternion, Vector3,
};

pub type Real = f64;

pub type Vec3 = Vector3<Real>;
pub type Pt2 = Point2<Real>;
pub type Pt3 = Point3<Real>;
pub type Mat3 = Matrix3<Real>;
pub type Iso3 = Isometry3<Real>;

/// Nearest rotation (Frobenius sense) to an arbitrary 3x3 matrix.
///
/// Calibration files frequently store extrinsic rotations with a few digits of
/// precision; this projects them back onto SO(3) before they are composed with
/// poses.
pub fn project_to_so3(m: &Mat3) -> UnitQuaternion<Real> {
    let rot = Rotation3::from_matrix_eps(m, 1e-12, 100, Rotation3::identity());
    UnitQuaternion::from_rotation_matrix(&rot)
}

/// Build an isometry from a rotation matrix and a translation vector.
pub fn iso_from_rt(r: &Mat3, t: &Vec3) -> Iso3 {
    Iso3::from_parts(Translation3::from(*t), project_to_so3(r))
}

/// Rotation angle (radians) of the relative rotation between two isometries.
pub fn rotation_angle_between(a: &Iso3, b: &Iso3) -> Real {
    a.rotation.angle_to(&b.rotation)
}

/// Translation distance between two isometries.
pub fn translation_distance(a: &Iso3, b: &Iso3) -> Real {
    (a.translation.vector - b.translation.vector).norm()
}
