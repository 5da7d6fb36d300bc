//! A procedurally generated RGB-D scene.
//!
//! The world is a smooth height field `z = f(x, y)` facing cameras that look
//! along `+Z`. Frames are rendered by ray casting through each pixel, so
//! depth, registered depth and landmark projections are mutually exact up to
//! the noise added on purpose.

use std::sync::Arc;

use anyhow::Result;
use image::{Luma, Rgb, RgbImage};
use nalgebra::Rotation3;
use serde::{Deserialize, Serialize};

use super::noise::{unit, GaussianNoise};
use crate::{
    Calibration, DepthMap, FeatureExtractor, FeatureParams, Frame, FxFyCxCySkew, Iso3, KeyPoint,
    PreconditionError, Pt2, Pt3, Real, Vec3,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeightField {
    pub base: Real,
    pub amp_x: Real,
    pub freq_x: Real,
    pub amp_y: Real,
    pub freq_y: Real,
}

impl Default for HeightField {
    fn default() -> Self {
        Self {
            base: 2.0,
            amp_x: 0.05,
            freq_x: 3.0,
            amp_y: 0.04,
            freq_y: 2.0,
        }
    }
}

impl HeightField {
    pub fn height(&self, x: Real, y: Real) -> Real {
        self.base + self.amp_x * (self.freq_x * x).sin() + self.amp_y * (self.freq_y * y).cos()
    }

    pub fn point(&self, x: Real, y: Real) -> Pt3 {
        Pt3::new(x, y, self.height(x, y))
    }

    /// Ray parameter `s` where `origin + s * dir` meets the surface.
    ///
    /// Solved by fixed-point iteration on `s`, which contracts as long as the
    /// surface slope times the ray's lateral component stays below `dir.z`.
    pub fn intersect(&self, origin: &Pt3, dir: &Vec3) -> Option<Real> {
        if dir.z <= 1e-9 {
            return None;
        }
        let mut s = (self.base - origin.z) / dir.z;
        for _ in 0..64 {
            let p = origin + dir * s;
            let next = (self.height(p.x, p.y) - origin.z) / dir.z;
            if (next - s).abs() < 1e-12 {
                return (next > 0.0).then_some(next);
            }
            s = next;
        }
        None
    }
}

/// Landmarks laid out on a jittered grid over the surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LandmarkLayout {
    pub nx: usize,
    pub ny: usize,
    pub half_extent_x: Real,
    pub half_extent_y: Real,
    /// Jitter as a fraction of the grid spacing.
    pub jitter: Real,
}

impl Default for LandmarkLayout {
    fn default() -> Self {
        Self {
            nx: 8,
            ny: 6,
            half_extent_x: 0.8,
            half_extent_y: 0.55,
            jitter: 0.4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneConfig {
    pub width: u32,
    pub height: u32,
    pub calibration: Calibration,
    pub surface: HeightField,
    pub landmarks: LandmarkLayout,
    pub descriptor_len: usize,
    pub seed: u64,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            width: 160,
            height: 120,
            calibration: default_calibration(),
            surface: HeightField::default(),
            landmarks: LandmarkLayout::default(),
            descriptor_len: 32,
            seed: 0xC0FFEE,
        }
    }
}

/// A plausible small RGB-D rig: slightly different lenses, 2.5 cm baseline.
pub fn default_calibration() -> Calibration {
    Calibration {
        color_intrinsics: FxFyCxCySkew::new(150.0, 150.0, 79.5, 59.5),
        depth_intrinsics: FxFyCxCySkew::new(145.0, 146.0, 80.0, 60.5),
        r: *Rotation3::from_euler_angles(0.002, -0.003, 0.001).matrix(),
        t: Vec3::new(-0.025, 0.0005, 0.001),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Landmark {
    pub position: Pt3,
    pub descriptor: Vec<f32>,
}

/// Renders frames of a [`HeightField`] and knows where its landmarks are.
#[derive(Debug, Clone)]
pub struct SyntheticScene {
    config: SceneConfig,
    calibration: Arc<Calibration>,
    landmarks: Vec<Landmark>,
}

const DESCRIPTOR_STREAM: u64 = 0xD35C;
const JITTER_STREAM: u64 = 0x717E;

impl SyntheticScene {
    pub fn new(config: SceneConfig) -> Self {
        let lay = &config.landmarks;
        let sx = 2.0 * lay.half_extent_x / lay.nx.max(1) as Real;
        let sy = 2.0 * lay.half_extent_y / lay.ny.max(1) as Real;

        let mut landmarks = Vec::with_capacity(lay.nx * lay.ny);
        for j in 0..lay.ny {
            for i in 0..lay.nx {
                let idx = (j * lay.nx + i) as u64;
                let jx = (unit(config.seed, JITTER_STREAM, idx, 0) - 0.5) * lay.jitter * sx;
                let jy = (unit(config.seed, JITTER_STREAM, idx, 1) - 0.5) * lay.jitter * sy;
                let x = -lay.half_extent_x + (i as Real + 0.5) * sx + jx;
                let y = -lay.half_extent_y + (j as Real + 0.5) * sy + jy;
                let descriptor = (0..config.descriptor_len as u64)
                    .map(|k| unit(config.seed, DESCRIPTOR_STREAM, idx, k) as f32)
                    .collect();
                landmarks.push(Landmark {
                    position: config.surface.point(x, y),
                    descriptor,
                });
            }
        }

        Self {
            calibration: Arc::new(config.calibration.clone()),
            config,
            landmarks,
        }
    }

    pub fn config(&self) -> &SceneConfig {
        &self.config
    }

    pub fn calibration(&self) -> Arc<Calibration> {
        self.calibration.clone()
    }

    pub fn landmarks(&self) -> &[Landmark] {
        &self.landmarks
    }

    /// Cast the ray through pixel `(x, y)`; camera-frame depth and world hit.
    fn cast(
        &self,
        cam_se3_world: &Iso3,
        k: &FxFyCxCySkew<Real>,
        x: u32,
        y: u32,
    ) -> Option<(Real, Pt3)> {
        let ray_c = k.backproject(&Pt2::new(x as Real, y as Real), 1.0);
        let world_se3_cam = cam_se3_world.inverse();
        let origin = Pt3::from(world_se3_cam.translation.vector);
        let dir = world_se3_cam.rotation * ray_c.coords;
        let s = self.config.surface.intersect(&origin, &dir)?;
        Some((s, origin + dir * s))
    }

    /// Depth image of the surface seen through `k` from `cam_se3_world`.
    pub fn render_depth(&self, cam_se3_world: &Iso3, k: &FxFyCxCySkew<Real>) -> DepthMap {
        DepthMap::from_fn(self.config.width, self.config.height, |x, y| {
            Luma([self.cast(cam_se3_world, k, x, y).map_or(0.0, |(d, _)| d as f32)])
        })
    }

    /// Render a calibrated frame whose depth camera sits at `depth_se3_world`.
    ///
    /// Raw depth is rendered through the depth camera; mapped depth and the
    /// color image through the color camera.
    pub fn render(&self, id: u64, depth_se3_world: Iso3) -> Result<Frame, PreconditionError> {
        let calib = &self.calibration;
        let color_se3_world = calib.color_se3_depth() * depth_se3_world;
        let k = calib.color_intrinsics;

        let depth = self.render_depth(&depth_se3_world, &calib.depth_intrinsics);
        let mut mapped = DepthMap::new(self.config.width, self.config.height);
        let mut color = RgbImage::new(self.config.width, self.config.height);
        for y in 0..self.config.height {
            for x in 0..self.config.width {
                if let Some((d, hit)) = self.cast(&color_se3_world, &k, x, y) {
                    mapped.put_pixel(x, y, Luma([d as f32]));
                    color.put_pixel(x, y, checker(&hit));
                }
            }
        }

        let mut frame = Frame::new(id, color, depth).with_calibration(self.calibration());
        frame.set_mapped_depth(mapped)?;
        frame.set_depth_se3_world(depth_se3_world);
        Ok(frame)
    }

    /// Feature extractor that "detects" this scene's landmarks.
    pub fn extractor(&self, pixel_noise: GaussianNoise) -> LandmarkExtractor {
        LandmarkExtractor {
            landmarks: self.landmarks.clone(),
            pixel_noise,
        }
    }
}

fn checker(p: &Pt3) -> Rgb<u8> {
    let cell = ((p.x / 0.1).floor() as i64 + (p.y / 0.1).floor() as i64).rem_euclid(2);
    let shade = if cell == 0 { 60 } else { 200 };
    Rgb([shade, shade, shade])
}

/// Projects known landmarks into a frame using the frame's own pose.
///
/// Pixel noise is keyed by `(frame id, landmark index)`, so re-detecting on
/// the same frame is reproducible.
#[derive(Debug, Clone)]
pub struct LandmarkExtractor {
    landmarks: Vec<Landmark>,
    pixel_noise: GaussianNoise,
}

impl FeatureExtractor for LandmarkExtractor {
    fn detect(&self, frame: &Frame, _params: &FeatureParams) -> Result<Vec<KeyPoint>> {
        let calib = frame
            .calibration()
            .ok_or(PreconditionError::MissingCalibration)?;
        let depth_pose = frame
            .depth_pose()
            .ok_or(PreconditionError::MissingCalibration)?;
        let color_pose = depth_pose.to_color_camera_with(calib);
        let (w, h) = frame.color().dimensions();

        let mut keypoints = Vec::new();
        for (idx, lm) in self.landmarks.iter().enumerate() {
            let Some(px) = color_pose.project(&lm.position) else {
                continue;
            };
            let u = px.x + self.pixel_noise.sample(frame.id(), idx as u64, 0);
            let v = px.y + self.pixel_noise.sample(frame.id(), idx as u64, 1);
            if u < 0.0 || v < 0.0 || u > (w - 1) as Real || v > (h - 1) as Real {
                continue;
            }
            keypoints.push(KeyPoint {
                pt: Pt2::new(u, v),
                response: 1.0 / (1.0 + idx as f32),
                descriptor: lm.descriptor.clone(),
            });
        }
        log::debug!("frame {}: {} landmarks in view", frame.id(), keypoints.len());
        Ok(keypoints)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FeatureSet;
    use nalgebra::Translation3;

    #[test]
    fn ray_cast_hits_the_surface() {
        let surface = HeightField::default();
        let origin = Pt3::new(0.1, -0.2, 0.0);
        let dir = Vec3::new(0.2, 0.1, 1.0);
        let s = surface.intersect(&origin, &dir).unwrap();
        let hit = origin + dir * s;
        assert!((hit.z - surface.height(hit.x, hit.y)).abs() < 1e-9);
    }

    #[test]
    fn mapped_depth_agrees_with_landmark_depth() {
        let scene = SyntheticScene::new(SceneConfig::default());
        let frame = scene.render(0, Iso3::identity()).unwrap();
        let calib = scene.calibration();
        let color_pose = frame.depth_pose().unwrap().to_color_camera_with(&calib);

        let mut checked = 0;
        for lm in scene.landmarks() {
            let px = color_pose.project(&lm.position).unwrap();
            let z = color_pose.cam_se3_world().transform_point(&lm.position).z;
            let d = frame.mapped_depth_at(px.x, px.y).unwrap();
            // Nearest-pixel sampling on a gently sloped surface.
            assert!((d - z).abs() < 5e-3, "depth {d} vs {z}");
            checked += 1;
        }
        assert_eq!(checked, 48);
    }

    #[test]
    fn extracted_features_back_project_onto_landmarks() {
        let scene = SyntheticScene::new(SceneConfig::default());
        let mut pose = Iso3::identity();
        pose.append_translation_mut(&Translation3::new(0.05, 0.0, 0.0));
        let frame = scene.render(3, pose).unwrap();
        let extractor = scene.extractor(GaussianNoise::default());

        let mut set = FeatureSet::extract(&frame, &extractor, &FeatureParams::default()).unwrap();
        assert!(set.len() >= 40);
        let calib = scene.calibration();
        set.compute_3d_locations(&frame.depth_pose().unwrap().to_color_camera_with(&calib));
        for p in set.points() {
            let p3d = p.p3d.unwrap();
            let nearest = scene
                .landmarks()
                .iter()
                .map(|lm| (lm.position - p3d).norm())
                .fold(Real::INFINITY, Real::min);
            assert!(nearest < 5e-3);
        }
    }
}
