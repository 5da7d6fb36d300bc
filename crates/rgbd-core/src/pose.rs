//! Camera poses tagged with the sensor they describe.
//!
//! An RGB-D device has two physically distinct cameras. A [`Pose`] carries its
//! sensor as a type parameter so depth-camera and color-camera poses cannot be
//! mixed in arithmetic; the only way across is through
//! [`Pose::to_color_camera`] and [`Pose::to_depth_camera`], which need the
//! extrinsic calibration.

use std::fmt;
use std::marker::PhantomData;

use serde::{Deserialize, Serialize};

use crate::{iso_from_rt, Calibration, FxFyCxCySkew, Iso3, Mat3, Pt2, Pt3, Real, Vec3};

/// Marker trait for the two sensor frames of an RGB-D camera.
pub trait CameraFrame: Copy + Clone + fmt::Debug + Default + PartialEq + 'static {
    const NAME: &'static str;
}

/// Frame of the depth (IR) camera. Canonical for downstream consumers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepthCamera;

/// Frame of the color camera. 2D keypoints live here.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColorCamera;

impl CameraFrame for DepthCamera {
    const NAME: &'static str = "depth";
}

impl CameraFrame for ColorCamera {
    const NAME: &'static str = "color";
}

/// Rigid camera pose `T_C_W` (world to camera) plus the intrinsics used for
/// projecting through that camera.
#[derive(Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct Pose<F: CameraFrame> {
    cam_se3_world: Iso3,
    intrinsics: FxFyCxCySkew<Real>,
    #[serde(skip)]
    frame: PhantomData<F>,
}

pub type DepthPose = Pose<DepthCamera>;
pub type ColorPose = Pose<ColorCamera>;

impl<F: CameraFrame> Pose<F> {
    pub fn new(cam_se3_world: Iso3, intrinsics: FxFyCxCySkew<Real>) -> Self {
        Self {
            cam_se3_world,
            intrinsics,
            frame: PhantomData,
        }
    }

    /// Camera at the world origin.
    pub fn identity(intrinsics: FxFyCxCySkew<Real>) -> Self {
        Self::new(Iso3::identity(), intrinsics)
    }

    pub fn cam_se3_world(&self) -> &Iso3 {
        &self.cam_se3_world
    }

    pub fn world_se3_cam(&self) -> Iso3 {
        self.cam_se3_world.inverse()
    }

    pub fn intrinsics(&self) -> &FxFyCxCySkew<Real> {
        &self.intrinsics
    }

    /// Replace the rigid part, keeping the sensor and intrinsics.
    pub fn with_transform(&self, cam_se3_world: Iso3) -> Self {
        Self::new(cam_se3_world, self.intrinsics)
    }

    pub fn rotation_matrix(&self) -> Mat3 {
        *self.cam_se3_world.rotation.to_rotation_matrix().matrix()
    }

    pub fn translation(&self) -> Vec3 {
        self.cam_se3_world.translation.vector
    }

    /// Pixel and depth to a world-space point.
    pub fn unproject(&self, pixel: &Pt2, depth: Real) -> Pt3 {
        let p_c = self.intrinsics.backproject(pixel, depth);
        self.cam_se3_world.inverse_transform_point(&p_c)
    }

    /// World point to pixel. `None` behind the camera.
    pub fn project(&self, p_w: &Pt3) -> Option<Pt2> {
        self.intrinsics.project(&self.cam_se3_world.transform_point(p_w))
    }
}

impl Pose<DepthCamera> {
    /// Re-express a depth-camera pose as the pose of the color camera.
    ///
    /// `T_Cc_W = [R|T] * T_Cd_W`; the color intrinsics replace the depth ones.
    pub fn to_color_camera(
        &self,
        color_intrinsics: &FxFyCxCySkew<Real>,
        r: &Mat3,
        t: &Vec3,
    ) -> Pose<ColorCamera> {
        let color_se3_depth = iso_from_rt(r, t);
        Pose::new(color_se3_depth * self.cam_se3_world, *color_intrinsics)
    }

    pub fn to_color_camera_with(&self, calib: &Calibration) -> Pose<ColorCamera> {
        self.to_color_camera(&calib.color_intrinsics, &calib.r, &calib.t)
    }
}

impl Pose<ColorCamera> {
    /// Re-express a color-camera pose as the pose of the depth camera.
    ///
    /// Exact inverse of [`Pose::to_color_camera`] for the same `R`, `T`.
    pub fn to_depth_camera(
        &self,
        depth_intrinsics: &FxFyCxCySkew<Real>,
        r: &Mat3,
        t: &Vec3,
    ) -> Pose<DepthCamera> {
        let color_se3_depth = iso_from_rt(r, t);
        Pose::new(
            color_se3_depth.inverse() * self.cam_se3_world,
            *depth_intrinsics,
        )
    }

    pub fn to_depth_camera_with(&self, calib: &Calibration) -> Pose<DepthCamera> {
        self.to_depth_camera(&calib.depth_intrinsics, &calib.r, &calib.t)
    }
}

impl<F: CameraFrame> fmt::Debug for Pose<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let t = self.translation();
        let (roll, pitch, yaw) = self.cam_se3_world.rotation.euler_angles();
        f.debug_struct("Pose")
            .field("frame", &F::NAME)
            .field("t", &[t.x, t.y, t.z])
            .field("rpy", &[roll, pitch, yaw])
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{rotation_angle_between, translation_distance};
    use nalgebra::{Rotation3, Translation3};

    fn calib() -> Calibration {
        Calibration {
            color_intrinsics: FxFyCxCySkew::new(525.0, 525.0, 319.5, 239.5),
            depth_intrinsics: FxFyCxCySkew::new(585.0, 585.0, 316.0, 247.0),
            r: *Rotation3::from_euler_angles(0.004, -0.011, 0.002).matrix(),
            t: Vec3::new(-0.0254, -0.0013, -0.0022),
        }
    }

    #[test]
    fn depth_color_roundtrip_is_identity() {
        let calib = calib();
        let poses = [
            Iso3::identity(),
            Iso3::from_parts(
                Translation3::new(0.1, -0.4, 2.0),
                Rotation3::from_euler_angles(0.3, -0.2, 1.1).into(),
            ),
            Iso3::from_parts(
                Translation3::new(-3.0, 0.7, 0.2),
                Rotation3::from_euler_angles(-2.5, 0.9, -0.4).into(),
            ),
        ];
        for iso in poses {
            let depth = DepthPose::new(iso, calib.depth_intrinsics);
            let back = depth.to_color_camera_with(&calib).to_depth_camera_with(&calib);
            assert!(translation_distance(back.cam_se3_world(), &iso) < 1e-12);
            assert!(rotation_angle_between(back.cam_se3_world(), &iso) < 1e-12);
            assert_eq!(back.intrinsics(), &calib.depth_intrinsics);

            let color = ColorPose::new(iso, calib.color_intrinsics);
            let back = color.to_depth_camera_with(&calib).to_color_camera_with(&calib);
            assert!(translation_distance(back.cam_se3_world(), &iso) < 1e-12);
            assert!(rotation_angle_between(back.cam_se3_world(), &iso) < 1e-12);
        }
    }

    #[test]
    fn conversion_swaps_intrinsics_and_moves_camera() {
        let calib = calib();
        let depth = DepthPose::identity(calib.depth_intrinsics);
        let color = depth.to_color_camera_with(&calib);
        assert_eq!(color.intrinsics(), &calib.color_intrinsics);
        // A world point in front of the depth camera lands at R * p + T in the color camera.
        let p = Pt3::new(0.2, 0.1, 1.5);
        let in_color = color.cam_se3_world().transform_point(&p);
        let expected = calib.color_se3_depth() * p;
        assert!((in_color - expected).norm() < 1e-12);
    }

    #[test]
    fn unproject_inverts_project() {
        let calib = calib();
        let pose = ColorPose::new(
            Iso3::from_parts(
                Translation3::new(0.05, 0.0, 0.3),
                Rotation3::from_euler_angles(0.0, 0.1, 0.0).into(),
            ),
            calib.color_intrinsics,
        );
        let p_w = Pt3::new(0.2, -0.1, 2.0);
        let px = pose.project(&p_w).unwrap();
        let depth = pose.cam_se3_world().transform_point(&p_w).z;
        let back = pose.unproject(&px, depth);
        assert!((back - p_w).norm() < 1e-9);
    }
}
