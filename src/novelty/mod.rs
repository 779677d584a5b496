//! Novelty (zero-day) detection.
//!
//! The detector is fit on benign feature vectors only. Its score combines
//! two signals:
//! - the isolation forest anomaly score in (0, 1]
//! - the benign envelope excess: how far each dimension lies outside the
//!   range seen in training, relative to that range
//!
//! `score = isolation + envelope_weight * excess`. The zero-day threshold is
//! the `(1 - contamination)` quantile of the training scores.

pub mod forest;

pub use forest::IsolationForest;

use crate::error::{Result, ScanError};
use crate::features::FeatureVector;
use crate::model::ensure_input_size;
use crate::model::io::{read_model, write_model};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

const MODEL_NAME: &str = "novelty";

/// Training parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForestParams {
    pub trees: usize,
    /// Subsample size per tree.
    pub sample_size: usize,
    /// Expected share of anomalies in the training data.
    pub contamination: f64,
    pub seed: u64,
    /// Scale of the envelope excess in the score.
    pub envelope_weight: f64,
    /// Added to every training range so constant dimensions stay finite.
    pub envelope_floor: f64,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            trees: 100,
            sample_size: 256,
            contamination: 0.1,
            seed: 42,
            envelope_weight: 0.1,
            envelope_floor: 0.05,
        }
    }
}

/// Novelty output for one vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoveltyScore {
    /// Combined anomaly score; higher is more anomalous.
    pub score: f64,
    /// Threshold the score was compared with.
    pub threshold: f64,
    pub is_zero_day: bool,
    /// Isolation forest component.
    pub isolation: f64,
    /// Unweighted envelope excess.
    pub envelope_excess: f64,
}

/// Per-dimension min/max of the training vectors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenignEnvelope {
    pub lo: Vec<f32>,
    pub hi: Vec<f32>,
    pub floor: f64,
}

impl BenignEnvelope {
    fn fit(samples: &[Vec<f32>], floor: f64) -> Self {
        let dims = samples.first().map_or(0, |s| s.len());
        let mut lo = vec![f32::INFINITY; dims];
        let mut hi = vec![f32::NEG_INFINITY; dims];
        for s in samples {
            for (d, &v) in s.iter().enumerate() {
                lo[d] = lo[d].min(v);
                hi[d] = hi[d].max(v);
            }
        }
        Self { lo, hi, floor }
    }

    /// `sum max(0, lo - x, x - hi) / (hi - lo + floor)` over all dimensions.
    pub fn excess(&self, x: &[f32]) -> f64 {
        x.iter()
            .zip(self.lo.iter().zip(&self.hi))
            .map(|(&v, (&lo, &hi))| {
                let out = (lo - v).max(v - hi).max(0.0) as f64;
                if out == 0.0 {
                    0.0
                } else {
                    out / ((hi - lo) as f64 + self.floor)
                }
            })
            .sum()
    }
}

/// Fitted novelty detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoveltyDetector {
    pub version: String,
    pub input_size: usize,
    pub params: ForestParams,
    pub forest: IsolationForest,
    pub envelope: BenignEnvelope,
    /// Calibrated at fit time.
    pub threshold: f64,
    #[serde(skip)]
    fingerprint: String,
}

impl NoveltyDetector {
    /// Fit on benign vectors of equal length.
    pub fn fit(samples: &[FeatureVector], params: &ForestParams) -> Result<Self> {
        let Some(first) = samples.first() else {
            return Err(ScanError::InvalidConfig(
                "novelty training needs at least one sample".into(),
            ));
        };
        let input_size = first.len();
        if let Some(bad) = samples.iter().find(|s| s.len() != input_size) {
            return Err(ScanError::FeatureSizeMismatch {
                expected: input_size,
                actual: bad.len(),
            });
        }
        if params.trees == 0 || params.sample_size == 0 {
            return Err(ScanError::InvalidConfig(
                "novelty forest needs trees and a positive sample size".into(),
            ));
        }
        if !(0.0..1.0).contains(&params.contamination) {
            return Err(ScanError::InvalidConfig(format!(
                "contamination must lie in [0, 1), got {}",
                params.contamination
            )));
        }

        let rows: Vec<Vec<f32>> = samples.iter().map(|s| s.as_slice().to_vec()).collect();
        let forest = IsolationForest::fit(&rows, params.trees, params.sample_size, params.seed);
        let envelope = BenignEnvelope::fit(&rows, params.envelope_floor);
        let mut detector = Self {
            version: "1".to_string(),
            input_size,
            params: params.clone(),
            forest,
            envelope,
            threshold: 0.0,
            fingerprint: String::new(),
        };

        let mut scores: Vec<f64> = rows.iter().map(|r| detector.raw_score(r).0).collect();
        scores.sort_by(f64::total_cmp);
        let rank = ((1.0 - params.contamination) * scores.len() as f64).ceil() as usize;
        detector.threshold = scores[rank.clamp(1, scores.len()) - 1];
        info!(
            samples = rows.len(),
            trees = params.trees,
            threshold = detector.threshold,
            "Fitted novelty detector"
        );
        Ok(detector)
    }

    /// Replace the calibrated threshold.
    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// (combined, isolation, excess)
    fn raw_score(&self, x: &[f32]) -> (f64, f64, f64) {
        let isolation = self.forest.score(x);
        let excess = self.envelope.excess(x);
        (
            isolation + self.params.envelope_weight * excess,
            isolation,
            excess,
        )
    }

    /// Score one vector against the benign training distribution.
    pub fn score(&self, features: &FeatureVector) -> Result<NoveltyScore> {
        ensure_input_size(self.input_size, features.len())?;
        let (score, isolation, envelope_excess) = self.raw_score(features);
        Ok(NoveltyScore {
            score,
            threshold: self.threshold,
            is_zero_day: score > self.threshold,
            isolation,
            envelope_excess,
        })
    }

    /// Load and validate a detector file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let (mut detector, fingerprint): (NoveltyDetector, String) = read_model(path, MODEL_NAME)?;
        detector.validate()?;
        detector.fingerprint = fingerprint;
        info!(
            path = %path.display(),
            fingerprint = %detector.fingerprint,
            threshold = detector.threshold,
            "Loaded novelty detector"
        );
        Ok(detector)
    }

    pub fn save(&mut self, path: impl AsRef<Path>) -> Result<()> {
        self.fingerprint = write_model(path.as_ref(), &*self)?;
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        let fail = |reason: String| Err(ScanError::model_unavailable(MODEL_NAME, reason));
        if self.input_size == 0 || self.forest.trees.is_empty() {
            return fail("detector has no trees or zero input size".into());
        }
        if self.envelope.lo.len() != self.input_size || self.envelope.hi.len() != self.input_size {
            return fail("envelope does not match input_size".into());
        }
        if !(self.threshold.is_finite() && self.threshold > 0.0) {
            return fail(format!("threshold must be positive, got {}", self.threshold));
        }
        if !(self.envelope.floor > 0.0) {
            return fail("envelope floor must be positive".into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn benign(n: usize) -> Vec<FeatureVector> {
        let mut rng = StdRng::seed_from_u64(11);
        (0..n)
            .map(|_| {
                let mut v: Vec<f32> = (0..8).map(|_| rng.gen_range(0.2f32..0.4)).collect();
                v.push(0.0);
                FeatureVector::from_values(v)
            })
            .collect()
    }

    fn params() -> ForestParams {
        ForestParams {
            trees: 40,
            sample_size: 64,
            ..ForestParams::default()
        }
    }

    #[test]
    fn training_quantile_threshold() {
        let data = benign(200);
        let det = NoveltyDetector::fit(&data, &params()).unwrap();
        let flagged = data
            .iter()
            .filter(|v| det.score(v).unwrap().is_zero_day)
            .count();
        // at most the contamination share of training data is above threshold
        assert!(flagged <= 20, "flagged={flagged}");
    }

    #[test]
    fn constant_dimension_outlier_is_flagged() {
        let data = benign(200);
        let det = NoveltyDetector::fit(&data, &params()).unwrap();
        let mut v = data[0].as_slice().to_vec();
        v[8] = 1.0;
        let s = det.score(&FeatureVector::from_values(v)).unwrap();
        assert!(s.is_zero_day);
        assert!((s.envelope_excess - 20.0).abs() < 1e-6);
    }

    #[test]
    fn length_mismatch() {
        let det = NoveltyDetector::fit(&benign(20), &params()).unwrap();
        let err = det
            .score(&FeatureVector::from_values(vec![0.0; 3]))
            .unwrap_err();
        assert_eq!(err.code(), "E_FEATURE_SIZE");
    }

    #[test]
    fn empty_training_rejected() {
        assert!(NoveltyDetector::fit(&[], &params()).is_err());
    }

    #[test]
    fn save_load_preserves_scores() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("novelty.json");
        let data = benign(50);
        let mut det = NoveltyDetector::fit(&data, &params()).unwrap();
        det.save(&path).unwrap();
        let loaded = NoveltyDetector::load(&path).unwrap();
        assert_eq!(loaded.fingerprint(), det.fingerprint());
        assert_eq!(loaded.score(&data[3]).unwrap(), det.score(&data[3]).unwrap());
    }
}
