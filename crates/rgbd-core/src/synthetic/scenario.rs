//! Serializable two-frame scenarios, as consumed by the command line tool.

use nalgebra::{Rotation3, Translation3};
use serde::{Deserialize, Serialize};

use super::noise::GaussianNoise;
use super::scene::{LandmarkExtractor, SceneConfig, SyntheticScene};
use crate::{Frame, Iso3, PreconditionError, Real};

/// A rigid transform written the way people type it into a JSON file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoseSpec {
    pub translation: [Real; 3],
    /// Roll, pitch, yaw in radians.
    pub rotation_rpy: [Real; 3],
}

impl PoseSpec {
    pub fn from_translation(x: Real, y: Real, z: Real) -> Self {
        Self {
            translation: [x, y, z],
            rotation_rpy: [0.0; 3],
        }
    }

    pub fn to_iso(&self) -> Iso3 {
        let [x, y, z] = self.translation;
        let [roll, pitch, yaw] = self.rotation_rpy;
        Iso3::from_parts(
            Translation3::new(x, y, z),
            Rotation3::from_euler_angles(roll, pitch, yaw).into(),
        )
    }
}

/// A target and a source view of one synthetic scene.
///
/// Both poses are `cam_se3_world` of the depth camera.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyntheticScenario {
    pub scene: SceneConfig,
    pub target: PoseSpec,
    pub source: PoseSpec,
    /// Standard deviation of keypoint noise, pixels.
    pub pixel_noise_sigma: Real,
    pub noise_seed: u64,
}

impl Default for SyntheticScenario {
    fn default() -> Self {
        Self {
            scene: SceneConfig::default(),
            target: PoseSpec::default(),
            source: PoseSpec::from_translation(0.1, 0.0, 0.0),
            pixel_noise_sigma: 0.05,
            noise_seed: 17,
        }
    }
}

/// Rendered frames plus the extractor that sees the scene's landmarks.
#[derive(Debug, Clone)]
pub struct ScenarioFrames {
    pub scene: SyntheticScene,
    pub target: Frame,
    pub source: Frame,
    pub extractor: LandmarkExtractor,
}

impl SyntheticScenario {
    pub fn build(&self) -> Result<ScenarioFrames, PreconditionError> {
        let scene = SyntheticScene::new(self.scene.clone());
        let target = scene.render(0, self.target.to_iso())?;
        let source = scene.render(1, self.source.to_iso())?;
        let extractor = scene.extractor(GaussianNoise::new(self.noise_seed, self.pixel_noise_sigma));
        Ok(ScenarioFrames {
            scene,
            target,
            source,
            extractor,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scenario_json_fills_missing_fields_with_defaults() {
        let json = r#"{ "source": { "translation": [0.0, 0.05, 0.0] } }"#;
        let scenario: SyntheticScenario = serde_json::from_str(json).unwrap();
        assert_eq!(scenario.source.translation, [0.0, 0.05, 0.0]);
        assert_eq!(scenario.source.rotation_rpy, [0.0; 3]);
        assert_eq!(scenario.scene, SceneConfig::default());
    }

    #[test]
    fn build_renders_both_frames_with_their_poses() {
        let frames = SyntheticScenario::default().build().unwrap();
        assert_eq!(frames.target.id(), 0);
        assert_eq!(frames.source.id(), 1);
        assert!(frames.source.mapped_depth().is_some());
        let t = frames.source.depth_se3_world().translation.vector;
        assert!((t.x - 0.1).abs() < 1e-12);
    }
}
