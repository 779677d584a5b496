//! Malware classifier.
//!
//! Inference sits behind the [`Classifier`] trait so any model with a logit
//! over the feature vector can replace [`HybridModel`] without touching
//! fusion or explanation code. Attribution is model-agnostic (occlusion).

pub mod attribution;
pub mod hybrid;
pub mod io;

pub use hybrid::{HybridModel, ModelShape};

use crate::error::{Result, ScanError};
use crate::features::FeatureVector;
use serde::{Deserialize, Serialize};

#[inline]
pub fn sigmoid(z: f32) -> f32 {
    1.0 / (1.0 + (-z).exp())
}

/// Classifier output for one vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifierScore {
    /// Calibrated probability of maliciousness in [0,1].
    pub probability: f32,
    /// Calibrated logit; `probability = sigmoid(logit)`.
    pub logit: f32,
    /// Contribution of every feature to the logit, in input order.
    pub contributions: Vec<f32>,
}

/// A binary malware classifier over fixed-length feature vectors.
pub trait Classifier: Send + Sync {
    /// Expected feature vector length.
    fn input_size(&self) -> usize;

    /// Calibrated logit. Callers guarantee `x.len() == input_size()`.
    fn logit(&self, x: &[f32]) -> f32;

    /// Reference input used for occlusion; `None` means all zeros.
    fn baseline(&self) -> Option<&[f32]> {
        None
    }

    /// Identifier of the loaded weights.
    fn fingerprint(&self) -> &str {
        "unversioned"
    }

    /// Probability and per-feature attribution.
    fn infer(&self, features: &FeatureVector) -> Result<ClassifierScore> {
        ensure_input_size(self.input_size(), features.len())?;
        let logit = self.logit(features);
        let probability = sigmoid(logit);
        let contributions = attribution::occlusion(self, features);
        Ok(ClassifierScore {
            probability,
            logit,
            contributions,
        })
    }
}

pub(crate) fn ensure_input_size(expected: usize, actual: usize) -> Result<()> {
    if expected != actual {
        return Err(ScanError::FeatureSizeMismatch { expected, actual });
    }
    Ok(())
}
