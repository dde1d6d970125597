//! Robust Estimation Module
//!
//! Provides a generic RANSAC implementation that can be used for any model estimation task.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use crate::Error;
use std::marker::PhantomData;

/// Configuration for robust estimation
#[derive(Debug, Clone)]
pub struct RobustConfig {
    pub threshold: f64,
    pub max_iterations: usize,
    pub confidence: f64,
    /// Seed of the sampling generator. Equal inputs give equal models.
    pub seed: u64,
}

impl Default for RobustConfig {
    fn default() -> Self {
        Self {
            threshold: 3.0,
            max_iterations: 2000,
            confidence: 0.995,
            seed: 0x5eed,
        }
    }
}

impl RobustConfig {
    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn validate(&self) -> crate::Result<()> {
        if !(self.threshold.is_finite() && self.threshold > 0.0) {
            return Err(Error::InvalidParameter(format!("threshold must be positive, got {}", self.threshold)));
        }
        if self.max_iterations == 0 {
            return Err(Error::InvalidParameter("max_iterations must be >= 1".into()));
        }
        if !(self.confidence > 0.0 && self.confidence < 1.0) {
            return Err(Error::InvalidParameter(format!("confidence must be in (0, 1), got {}", self.confidence)));
        }
        Ok(())
    }
}

/// Result of robust estimation
#[derive(Debug, Clone)]
pub struct RobustResult<M> {
    pub model: Option<M>,
    pub inliers: Vec<bool>,
    pub num_inliers: usize,
    pub residual: f64,
}

impl<M> RobustResult<M> {
    fn empty(n: usize) -> Self {
        Self {
            model: None,
            inliers: vec![false; n],
            num_inliers: 0,
            residual: f64::INFINITY,
        }
    }
}

/// Trait for models that can be estimated robustly
pub trait RobustModel<D> {
    type Model: Clone;

    /// Minimum number of data points required to estimate the model
    fn min_sample_size(&self) -> usize;

    /// Estimate model from a sample (minimal or over-determined)
    fn estimate(&self, data: &[&D]) -> Option<Self::Model>;

    /// Compute error for a single data point against the model
    fn compute_error(&self, model: &Self::Model, data: &D) -> f64;
}

/// Generic RANSAC engine
pub struct Ransac<D, M: RobustModel<D>> {
    config: RobustConfig,
    _phantom: PhantomData<(D, M)>,
}

impl<D, M: RobustModel<D>> Ransac<D, M> {
    pub fn new(config: RobustConfig) -> Self {
        Self {
            config,
            _phantom: PhantomData,
        }
    }

    /// Runs hypothesise-and-verify sampling, then refits the best model on
    /// all of its inliers.
    pub fn run(&self, estimator: &M, data: &[D]) -> RobustResult<M::Model> {
        let n = data.len();
        let k = estimator.min_sample_size();

        if n < k || k == 0 {
            return RobustResult::empty(n);
        }

        let mut best = RobustResult::empty(n);
        let mut rng = StdRng::seed_from_u64(self.config.seed);
        let mut indices: Vec<usize> = (0..n).collect();
        let mut max_iterations = self.config.max_iterations;
        let mut iteration = 0;

        while iteration < max_iterations {
            iteration += 1;
            let (sample_idx, _) = indices.partial_shuffle(&mut rng, k);
            let sample: Vec<&D> = sample_idx.iter().map(|&i| &data[i]).collect();

            let Some(model) = estimator.estimate(&sample) else {
                continue;
            };
            let scored = self.score(estimator, model, data);
            if scored.num_inliers > best.num_inliers
                || (scored.num_inliers == best.num_inliers && scored.residual < best.residual)
            {
                best = scored;
                max_iterations = max_iterations.min(self.adaptive_iterations(best.num_inliers, n, k));
            }
        }

        if best.num_inliers >= k {
            let inlier_data: Vec<&D> = data
                .iter()
                .zip(best.inliers.iter())
                .filter(|(_, &inlier)| inlier)
                .map(|(d, _)| d)
                .collect();
            if let Some(refined) = estimator.estimate(&inlier_data) {
                let rescored = self.score(estimator, refined, data);
                if rescored.num_inliers >= best.num_inliers {
                    best = rescored;
                }
            }
        }

        best
    }

    fn score(&self, estimator: &M, model: M::Model, data: &[D]) -> RobustResult<M::Model> {
        let mut inliers = vec![false; data.len()];
        let mut num_inliers = 0;
        let mut total_error = 0.0;

        for (j, d) in data.iter().enumerate() {
            let err = estimator.compute_error(&model, d);
            if err < self.config.threshold {
                inliers[j] = true;
                num_inliers += 1;
                total_error += err;
            }
        }

        let residual = if num_inliers > 0 {
            total_error / num_inliers as f64
        } else {
            f64::INFINITY
        };

        RobustResult {
            model: Some(model),
            inliers,
            num_inliers,
            residual,
        }
    }

    fn adaptive_iterations(&self, num_inliers: usize, n: usize, k: usize) -> usize {
        let inlier_ratio = num_inliers as f64 / n as f64;
        let p_good = inlier_ratio.powi(k as i32);
        if p_good >= 1.0 - f64::EPSILON {
            return 1;
        }
        if p_good <= f64::EPSILON {
            return self.config.max_iterations;
        }
        let needed = (1.0 - self.config.confidence).ln() / (1.0 - p_good).ln();
        if needed.is_finite() && needed >= 0.0 {
            (needed.ceil() as usize).max(1)
        } else {
            self.config.max_iterations
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// y = a * x + b
    struct LineModel;

    impl RobustModel<(f64, f64)> for LineModel {
        type Model = (f64, f64);

        fn min_sample_size(&self) -> usize {
            2
        }

        fn estimate(&self, data: &[&(f64, f64)]) -> Option<Self::Model> {
            let n = data.len() as f64;
            let mx = data.iter().map(|p| p.0).sum::<f64>() / n;
            let my = data.iter().map(|p| p.1).sum::<f64>() / n;
            let sxx: f64 = data.iter().map(|p| (p.0 - mx).powi(2)).sum();
            if sxx < 1e-12 {
                return None;
            }
            let sxy: f64 = data.iter().map(|p| (p.0 - mx) * (p.1 - my)).sum();
            let a = sxy / sxx;
            Some((a, my - a * mx))
        }

        fn compute_error(&self, model: &Self::Model, p: &(f64, f64)) -> f64 {
            (model.0 * p.0 + model.1 - p.1).abs()
        }
    }

    #[test]
    fn ransac_rejects_outliers() {
        let mut data: Vec<(f64, f64)> = (0..50).map(|i| (i as f64, 2.0 * i as f64 + 1.0)).collect();
        data.extend((0..10).map(|i| (i as f64, 500.0 + i as f64 * 13.0)));

        let result = Ransac::new(RobustConfig::default().with_threshold(0.5)).run(&LineModel, &data);
        let (a, b) = result.model.expect("model");
        assert!((a - 2.0).abs() < 1e-6);
        assert!((b - 1.0).abs() < 1e-6);
        assert_eq!(result.num_inliers, 50);
        assert!(!result.inliers[55]);
    }

    #[test]
    fn ransac_too_few_points() {
        let result = Ransac::new(RobustConfig::default()).run(&LineModel, &[(0.0, 0.0)]);
        assert!(result.model.is_none());
        assert_eq!(result.num_inliers, 0);
    }

    #[test]
    fn ransac_is_deterministic() {
        let data: Vec<(f64, f64)> = (0..30)
            .map(|i| (i as f64, if i % 3 == 0 { 100.0 } else { -(i as f64) }))
            .collect();
        let config = RobustConfig::default().with_threshold(0.1);
        let a = Ransac::new(config.clone()).run(&LineModel, &data);
        let b = Ransac::new(config).run(&LineModel, &data);
        assert_eq!(a.inliers, b.inliers);
    }
}
