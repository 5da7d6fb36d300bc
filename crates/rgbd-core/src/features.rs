//! Keypoints with depth and descriptors, and descriptor matching.
//!
//! Detection and description are an external capability behind
//! [`FeatureExtractor`]; this module owns what happens around it: sampling
//! the registered depth at each keypoint, back-projecting keypoints into the
//! world, and ratio-test matching between two feature sets.

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::{ColorPose, Frame, PreconditionError, Pt2, Pt3, Real};

/// Squared descriptor-distance ratio used between a target and a source set.
///
/// Kept as the literal `0.8 * 0.8` the tracker has always used.
pub const DEFAULT_MATCH_RATIO_SQ: Real = 0.8 * 0.8;

/// A raw detection handed back by a [`FeatureExtractor`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyPoint {
    /// Sub-pixel location on the color image.
    pub pt: Pt2,
    /// Detector response; larger is stronger.
    pub response: f32,
    pub descriptor: Vec<f32>,
}

/// A keypoint augmented with the registered depth and, once a pose is known,
/// its world position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeaturePoint {
    pub pt: Pt2,
    /// Mapped depth at `pt` in meters; `0` when unmeasured.
    pub depth: Real,
    pub descriptor: Vec<f32>,
    /// World-space location, filled by [`FeatureSet::compute_3d_locations`].
    pub p3d: Option<Pt3>,
}

impl FeaturePoint {
    pub fn has_depth(&self) -> bool {
        self.depth > 0.0
    }
}

/// Extraction knobs passed through to the detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureParams {
    /// Drop keypoints where the mapped depth has no measurement.
    pub only_with_depth: bool,
    /// Keep at most this many keypoints (strongest first).
    pub max_features: usize,
    /// Depth samples outside `[min_depth, max_depth]` count as missing.
    pub min_depth: Real,
    pub max_depth: Real,
}

impl Default for FeatureParams {
    fn default() -> Self {
        Self {
            only_with_depth: true,
            max_features: 1000,
            min_depth: 0.3,
            max_depth: 10.0,
        }
    }
}

/// Keypoint detection and description on the color image of a frame.
pub trait FeatureExtractor {
    fn detect(&self, frame: &Frame, params: &FeatureParams) -> Result<Vec<KeyPoint>>;
}

/// A pairing of one target feature with one source feature.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Correspondence {
    pub target_idx: usize,
    pub source_idx: usize,
    /// Squared descriptor distance of the pair.
    pub distance_sq: f32,
}

/// Descriptor matching between a target set and a source set.
pub trait FeatureMatcher {
    fn match_sets(
        &self,
        target: &FeatureSet,
        source: &FeatureSet,
        ratio_sq: Real,
    ) -> Vec<Correspondence>;
}

/// Ordered keypoints extracted from one frame.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureSet {
    points: Vec<FeaturePoint>,
}

impl FeatureSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_points(points: Vec<FeaturePoint>) -> Self {
        Self { points }
    }

    /// Detect keypoints on `frame` and attach their registered depth.
    ///
    /// Requires mapped depth: without it the keypoints cannot be lifted to 3D.
    pub fn extract(
        frame: &Frame,
        extractor: &dyn FeatureExtractor,
        params: &FeatureParams,
    ) -> Result<Self> {
        if frame.mapped_depth().is_none() {
            return Err(PreconditionError::MissingMappedDepth.into());
        }

        let mut keypoints = extractor.detect(frame, params)?;
        keypoints.sort_by(|a, b| b.response.total_cmp(&a.response));

        let points: Vec<FeaturePoint> = keypoints
            .into_iter()
            .filter_map(|kp| {
                let depth = frame
                    .mapped_depth_at(kp.pt.x, kp.pt.y)
                    .filter(|d| *d >= params.min_depth && *d <= params.max_depth)
                    .unwrap_or(0.0);
                if params.only_with_depth && depth <= 0.0 {
                    return None;
                }
                Some(FeaturePoint {
                    pt: kp.pt,
                    depth,
                    descriptor: kp.descriptor,
                    p3d: None,
                })
            })
            .take(params.max_features)
            .collect();

        Ok(Self { points })
    }

    pub fn points(&self) -> &[FeaturePoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Whether every point with depth has a world location.
    pub fn has_3d_locations(&self) -> bool {
        self.points.iter().all(|p| !p.has_depth() || p.p3d.is_some())
    }

    /// Forget world locations, e.g. after the pose they came from changed.
    pub fn clear_3d_locations(&mut self) {
        for p in &mut self.points {
            p.p3d = None;
        }
    }

    /// Lift every keypoint with depth into the world through a color-camera pose.
    pub fn compute_3d_locations(&mut self, pose: &ColorPose) {
        for p in &mut self.points {
            p.p3d = p.has_depth().then(|| pose.unproject(&p.pt, p.depth));
        }
    }

    /// Match this (target) set against `source`.
    pub fn match_with(
        &self,
        source: &FeatureSet,
        matcher: &dyn FeatureMatcher,
        ratio_sq: Real,
    ) -> Vec<Correspondence> {
        matcher.match_sets(self, source, ratio_sq)
    }
}

/// Exhaustive nearest / second-nearest descriptor matcher.
///
/// For each source feature the two closest target descriptors are found by
/// squared L2 distance; the pair is kept when `best < ratio_sq * second`.
/// Target features without a world location are never candidates. Each target
/// feature is used at most once, keeping its closest source.
#[derive(Debug, Clone, Copy, Default)]
pub struct BruteForceMatcher;

impl FeatureMatcher for BruteForceMatcher {
    fn match_sets(
        &self,
        target: &FeatureSet,
        source: &FeatureSet,
        ratio_sq: Real,
    ) -> Vec<Correspondence> {
        let mut best_for_target: Vec<Option<Correspondence>> = vec![None; target.len()];

        for (source_idx, s) in source.points().iter().enumerate() {
            let mut best: Option<(usize, f32)> = None;
            let mut second = f32::INFINITY;

            for (target_idx, t) in target.points().iter().enumerate() {
                if t.p3d.is_none() || t.descriptor.len() != s.descriptor.len() {
                    continue;
                }
                let d = descriptor_distance_sq(&t.descriptor, &s.descriptor);
                match best {
                    Some((_, bd)) if d >= bd => second = second.min(d),
                    Some((_, bd)) => {
                        second = bd;
                        best = Some((target_idx, d));
                    }
                    None => best = Some((target_idx, d)),
                }
            }

            let Some((target_idx, d)) = best else {
                continue;
            };
            if second.is_finite() && (d as Real) >= ratio_sq * (second as Real) {
                continue;
            }

            let candidate = Correspondence {
                target_idx,
                source_idx,
                distance_sq: d,
            };
            let slot = &mut best_for_target[target_idx];
            if slot.map_or(true, |c| d < c.distance_sq) {
                *slot = Some(candidate);
            }
        }

        let mut matches: Vec<Correspondence> = best_for_target.into_iter().flatten().collect();
        matches.sort_by_key(|c| c.source_idx);
        matches
    }
}

pub fn descriptor_distance_sq(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}
