//! Deterministic, model-agnostic RANSAC.
//!
//! Implement [`Estimator`] for a model and call [`ransac_fit`] with the data
//! and [`RansacOptions`]. The random stream is seeded from the options, so
//! identical inputs give identical results.
//!
//! The engine does not panic when no consensus exists: it returns a
//! [`RansacResult`] with `success == false` and no model.

use rand::prelude::IndexedRandom;
use rand::{rngs::StdRng, SeedableRng};
use serde::{Deserialize, Serialize};

/// Configuration parameters for the RANSAC engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RansacOptions {
    /// Maximum number of hypotheses drawn.
    pub max_iters: usize,
    /// Per-datum inlier tolerance, in the estimator's residual units.
    pub thresh: f64,
    /// Minimum consensus size for a model to be accepted.
    pub min_inliers: usize,
    /// Desired probability in `[0, 1]` of drawing at least one clean sample.
    pub confidence: f64,
    /// Seed for the sampling stream.
    pub seed: u64,
    /// Refit each hypothesis on its consensus set before scoring.
    pub refit_on_inliers: bool,
}

impl Default for RansacOptions {
    fn default() -> Self {
        Self {
            max_iters: 500,
            thresh: 0.03,
            min_inliers: 6,
            confidence: 0.999,
            seed: 1_234_567,
            refit_on_inliers: true,
        }
    }
}

/// Output of a RANSAC run.
#[derive(Debug, Clone)]
pub struct RansacResult<M> {
    /// Whether a consensus set satisfying the options was found.
    pub success: bool,
    /// Best model found (if any).
    pub model: Option<M>,
    /// Indices of inlier data, ascending.
    pub inliers: Vec<usize>,
    /// Residuals of `inliers`, same order.
    pub inlier_residuals: Vec<f64>,
    /// Root-mean-square residual over inliers.
    pub inlier_rms: f64,
    /// Number of hypotheses drawn.
    pub iters: usize,
}

impl<M> Default for RansacResult<M> {
    fn default() -> Self {
        Self {
            success: false,
            model: None,
            inliers: Vec::new(),
            inlier_residuals: Vec::new(),
            inlier_rms: f64::INFINITY,
            iters: 0,
        }
    }
}

impl<M> RansacResult<M> {
    /// Per-datum inlier flags for a data set of length `n`.
    pub fn inlier_mask(&self, n: usize) -> Vec<bool> {
        let mut mask = vec![false; n];
        for &i in &self.inliers {
            if i < n {
                mask[i] = true;
            }
        }
        mask
    }

    /// Sum of inlier residuals.
    pub fn inlier_residual_sum(&self) -> f64 {
        self.inlier_residuals.iter().sum()
    }
}

/// A model that RANSAC can hypothesize from minimal samples.
pub trait Estimator {
    type Datum;
    type Model;

    /// Minimal number of samples needed to estimate a model.
    const MIN_SAMPLES: usize;

    /// Fit a model from a subset of data indices; `None` if degenerate.
    fn fit(data: &[Self::Datum], sample_indices: &[usize]) -> Option<Self::Model>;

    /// Non-negative residual of one datum, in the units of `thresh`.
    fn residual(model: &Self::Model, datum: &Self::Datum) -> f64;

    /// Cheap rejection of samples that cannot define a model.
    fn is_degenerate(_data: &[Self::Datum], _sample_indices: &[usize]) -> bool {
        false
    }

    /// Least-squares fit on a consensus set. Default: keep the hypothesis.
    fn refit(_data: &[Self::Datum], _inliers: &[usize]) -> Option<Self::Model> {
        None
    }
}

fn rms(vals: &[f64]) -> f64 {
    if vals.is_empty() {
        return f64::INFINITY;
    }
    let ss: f64 = vals.iter().map(|&v| v * v).sum();
    (ss / (vals.len() as f64)).sqrt()
}

/// Iterations needed to draw an all-inlier sample with the given confidence.
fn adaptive_iterations(
    confidence: f64,
    inlier_ratio: f64,
    min_samples: usize,
    iters_so_far: usize,
    max_iters: usize,
) -> usize {
    if confidence <= 0.0 || inlier_ratio <= 0.0 {
        return max_iters;
    }
    if inlier_ratio >= 1.0 {
        return iters_so_far.min(max_iters);
    }

    let denom = (1.0 - inlier_ratio.powi(min_samples as i32)).max(1e-12).ln();
    if denom >= 0.0 {
        return max_iters;
    }

    let needed = ((1.0 - confidence).ln() / denom).ceil() as usize;
    needed.clamp(iters_so_far, max_iters)
}

fn score<E: Estimator>(
    data: &[E::Datum],
    model: &E::Model,
    thresh: f64,
    inliers: &mut Vec<usize>,
    residuals: &mut Vec<f64>,
) {
    inliers.clear();
    residuals.clear();
    for (i, datum) in data.iter().enumerate() {
        let r = E::residual(model, datum);
        if r <= thresh {
            inliers.push(i);
            residuals.push(r);
        }
    }
}

/// Run RANSAC for an [`Estimator`].
///
/// More inliers wins; ties go to the lower inlier RMS.
pub fn ransac_fit<E: Estimator>(data: &[E::Datum], opts: &RansacOptions) -> RansacResult<E::Model> {
    let mut best: RansacResult<E::Model> = RansacResult::default();

    if data.len() < E::MIN_SAMPLES {
        return best;
    }

    let all_indices: Vec<usize> = (0..data.len()).collect();
    let mut sample = vec![0usize; E::MIN_SAMPLES];
    let mut rng = StdRng::seed_from_u64(opts.seed);
    let mut budget = opts.max_iters;

    let mut inliers = Vec::with_capacity(data.len());
    let mut residuals = Vec::with_capacity(data.len());

    let mut iters = 0;
    while iters < budget {
        iters += 1;
        for (slot, &idx) in sample
            .iter_mut()
            .zip(all_indices.choose_multiple(&mut rng, E::MIN_SAMPLES))
        {
            *slot = idx;
        }

        if E::is_degenerate(data, &sample) {
            continue;
        }
        let Some(mut model) = E::fit(data, &sample) else {
            continue;
        };

        score::<E>(data, &model, opts.thresh, &mut inliers, &mut residuals);
        if inliers.len() < opts.min_inliers {
            continue;
        }

        if opts.refit_on_inliers {
            if let Some(refit) = E::refit(data, &inliers) {
                model = refit;
                score::<E>(data, &model, opts.thresh, &mut inliers, &mut residuals);
                if inliers.len() < opts.min_inliers {
                    continue;
                }
            }
        }

        let inlier_rms = rms(&residuals);
        let better = !best.success
            || inliers.len() > best.inliers.len()
            || (inliers.len() == best.inliers.len() && inlier_rms < best.inlier_rms);
        if better {
            best.success = true;
            best.model = Some(model);
            best.inliers.clone_from(&inliers);
            best.inlier_residuals.clone_from(&residuals);
            best.inlier_rms = inlier_rms;

            let ratio = best.inliers.len() as f64 / data.len() as f64;
            budget = adaptive_iterations(opts.confidence, ratio, E::MIN_SAMPLES, iters, opts.max_iters);
        }
    }

    best.iters = iters;
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone)]
    struct LineModel {
        slope: f64,
        intercept: f64,
    }

    struct LineEstimator;

    impl Estimator for LineEstimator {
        type Datum = (f64, f64);
        type Model = LineModel;

        const MIN_SAMPLES: usize = 2;

        fn fit(data: &[Self::Datum], sample_indices: &[usize]) -> Option<Self::Model> {
            let p0 = data[sample_indices[0]];
            let p1 = data[sample_indices[1]];
            let dx = p1.0 - p0.0;
            if dx.abs() < 1e-9 {
                return None;
            }
            let slope = (p1.1 - p0.1) / dx;
            Some(LineModel {
                slope,
                intercept: p0.1 - slope * p0.0,
            })
        }

        fn residual(model: &Self::Model, datum: &Self::Datum) -> f64 {
            let (x, y) = *datum;
            (model.slope * x - y + model.intercept).abs() / (model.slope.powi(2) + 1.0).sqrt()
        }

        fn refit(data: &[Self::Datum], inliers: &[usize]) -> Option<Self::Model> {
            let n = inliers.len() as f64;
            let (mut sx, mut sy, mut sxx, mut sxy) = (0.0, 0.0, 0.0, 0.0);
            for &i in inliers {
                let (x, y) = data[i];
                sx += x;
                sy += y;
                sxx += x * x;
                sxy += x * y;
            }
            let denom = n * sxx - sx * sx;
            if denom.abs() < 1e-12 {
                return None;
            }
            let slope = (n * sxy - sx * sy) / denom;
            Some(LineModel {
                slope,
                intercept: (sy - slope * sx) / n,
            })
        }
    }

    fn opts() -> RansacOptions {
        RansacOptions {
            max_iters: 500,
            thresh: 0.05,
            min_inliers: 6,
            confidence: 0.99,
            seed: 42,
            refit_on_inliers: true,
        }
    }

    fn noisy_line() -> Vec<(f64, f64)> {
        let mut data: Vec<(f64, f64)> = (0..10)
            .map(|i| {
                let x = i as f64 * 0.5;
                (x, 2.0 * x + 1.0 + if i % 2 == 0 { 0.01 } else { -0.01 })
            })
            .collect();
        data.extend([(5.0, -3.0), (6.0, 10.0), (7.0, -8.0)]);
        data
    }

    #[test]
    fn insufficient_data_reports_failure() {
        let res = ransac_fit::<LineEstimator>(&[(0.0, 0.0)], &opts());
        assert!(!res.success);
        assert!(res.model.is_none());
        assert!(res.inliers.is_empty());
    }

    #[test]
    fn recovers_line_and_flags_outliers() {
        let data = noisy_line();
        let res = ransac_fit::<LineEstimator>(&data, &opts());
        assert!(res.success);
        let model = res.model.as_ref().unwrap();
        assert!((model.slope - 2.0).abs() < 0.05);
        assert!((model.intercept - 1.0).abs() < 0.05);

        let mask = res.inlier_mask(data.len());
        assert!(mask[..10].iter().all(|&m| m));
        assert!(mask[10..].iter().all(|&m| !m));
        assert_eq!(res.inlier_residuals.len(), res.inliers.len());
    }

    #[test]
    fn same_seed_gives_same_result() {
        let data = noisy_line();
        let a = ransac_fit::<LineEstimator>(&data, &opts());
        let b = ransac_fit::<LineEstimator>(&data, &opts());
        assert_eq!(a.inliers, b.inliers);
        assert_eq!(a.iters, b.iters);
        assert_eq!(a.inlier_rms, b.inlier_rms);
    }
}
