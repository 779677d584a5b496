//! Verdict and explanation records.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Final classification label, ordered by severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Label {
    Benign,
    Suspicious,
    Malicious,
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Label::Benign => "benign",
            Label::Suspicious => "suspicious",
            Label::Malicious => "malicious",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureImportance {
    pub feature_name: String,
    /// |contribution| relative to the strongest feature, in [0,1].
    pub importance: f64,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuspiciousByte {
    pub offset: usize,
    /// Hex-encoded bytes at `offset`.
    pub byte_sequence: String,
    pub confidence: f64,
    pub reason: String,
}

/// Named confidence components. Serialized as a JSON object.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceBreakdown {
    pub classifier: f64,
    pub margin: f64,
    pub novelty: f64,
    pub heuristics: f64,
}

impl ConfidenceBreakdown {
    /// Sum of the components before clipping.
    pub fn sum(&self) -> f64 {
        self.classifier + self.margin + self.novelty + self.heuristics
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Explanation {
    pub feature_importance: Vec<FeatureImportance>,
    pub suspicious_bytes: Vec<SuspiciousByte>,
    pub model_decision: String,
    pub confidence_breakdown: ConfidenceBreakdown,
    pub risk_factors: Vec<String>,
}

/// Outcome of one completed scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub label: Label,
    /// Threat score in [0,1]. Rises with the classifier probability, novelty
    /// and findings regardless of the label, so a benign verdict carries a
    /// low value.
    pub confidence: f64,
    /// Certainty of `label` in [0.5,1]. Grows with the distance of the
    /// classifier probability from the boundary of the label's region.
    pub label_confidence: f64,
    pub is_zero_day: bool,
    pub explanation: Explanation,
    pub classifier_probability: f32,
    pub novelty_score: f64,
    /// Identifies the classifier and novelty weights that produced the verdict.
    pub model_fingerprint: String,
}
