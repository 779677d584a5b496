//! Verdict fusion.
//!
//! Combines the classifier probability, the novelty score and the heuristic
//! findings into a label, a confidence and an explanation.
//!
//! Label policy:
//! - malicious when `p >= threshold`
//! - otherwise suspicious when `p` lies in `[threshold - band, threshold)` or
//!   any finding has high severity
//! - otherwise benign
//!
//! The zero-day flag is copied from the novelty score and never changes the
//! label. Confidence is a threat score: the clipped sum of weighted components,
//! non-decreasing in `p` for fixed novelty and heuristic inputs. Label
//! confidence is separate and measures how far `p` sits inside the region of
//! the chosen label.

pub mod explain;
pub mod verdict;

pub use explain::Evidence;
pub use verdict::{ConfidenceBreakdown, Explanation, FeatureImportance, Label, SuspiciousByte, Verdict};

use crate::config::FusionConfig;
use crate::heuristics::{heuristic_score, HeuristicFinding, Severity};
use crate::model::ClassifierScore;
use crate::novelty::NoveltyScore;
use tracing::debug;

const THRESHOLD_EPSILON: f64 = 1e-9;

/// Fusion engine for one configuration.
#[derive(Debug, Clone)]
pub struct Fuser {
    config: FusionConfig,
    severity_saturation: f32,
    model_fingerprint: String,
}

impl Fuser {
    pub fn new(config: FusionConfig, severity_saturation: f32) -> Self {
        Self {
            config,
            severity_saturation,
            model_fingerprint: String::new(),
        }
    }

    /// Fingerprint recorded in every verdict.
    pub fn with_fingerprint(mut self, fingerprint: impl Into<String>) -> Self {
        self.model_fingerprint = fingerprint.into();
        self
    }

    pub fn config(&self) -> &FusionConfig {
        &self.config
    }

    /// Label for a probability and a set of findings.
    pub fn label(&self, probability: f64, findings: &[HeuristicFinding]) -> Label {
        let t = self.config.confidence_threshold;
        if probability >= t {
            Label::Malicious
        } else if probability >= t - self.config.suspicious_band
            || findings.iter().any(|f| f.severity == Severity::High)
        {
            Label::Suspicious
        } else {
            Label::Benign
        }
    }

    /// Weighted confidence components.
    pub fn breakdown(
        &self,
        probability: f64,
        novelty: &NoveltyScore,
        findings: &[HeuristicFinding],
    ) -> ConfidenceBreakdown {
        let w = &self.config.weights;
        let t = self.config.confidence_threshold;
        let margin = ((probability - t) / (1.0 - t)).clamp(0.0, 1.0);
        let relative_novelty = ((novelty.score - novelty.threshold)
            / novelty.threshold.max(THRESHOLD_EPSILON))
        .clamp(-1.0, 1.0);
        let zero_day_bonus = if novelty.is_zero_day { w.zero_day } else { 0.0 };
        ConfidenceBreakdown {
            classifier: w.classifier * probability,
            margin: w.margin * margin,
            novelty: w.novelty * relative_novelty + zero_day_bonus,
            heuristics: w.heuristics * heuristic_score(findings, self.severity_saturation) as f64,
        }
    }

    /// Certainty of `label` in [0.5,1].
    ///
    /// Malicious and benign grow with the distance of `p` from their boundary.
    /// A suspicious label comes from the band or from high findings, so it
    /// grows with the heuristic score instead.
    pub fn label_confidence(
        &self,
        probability: f64,
        label: Label,
        findings: &[HeuristicFinding],
    ) -> f64 {
        let t = self.config.confidence_threshold;
        let floor = t - self.config.suspicious_band;
        let distance = match label {
            Label::Malicious => (probability - t) / (1.0 - t).max(THRESHOLD_EPSILON),
            Label::Benign if floor > 0.0 => (floor - probability) / floor,
            Label::Benign => 1.0,
            Label::Suspicious => heuristic_score(findings, self.severity_saturation) as f64,
        };
        0.5 + 0.5 * distance.clamp(0.0, 1.0)
    }

    /// Fuse the three analysis results into a verdict.
    pub fn fuse(
        &self,
        classifier: &ClassifierScore,
        novelty: &NoveltyScore,
        findings: &[HeuristicFinding],
        evidence: &Evidence<'_>,
    ) -> Verdict {
        let p = (classifier.probability as f64).clamp(0.0, 1.0);
        let label = self.label(p, findings);
        let breakdown = self.breakdown(p, novelty, findings);
        let confidence = breakdown.sum().clamp(0.0, 1.0);
        let label_confidence = self.label_confidence(p, label, findings);

        let ranked = explain::ranked_features(&classifier.contributions);
        let feature_importance =
            explain::feature_importance(&ranked, evidence, self.config.top_k);
        let suspicious_bytes =
            explain::suspicious_bytes(findings, &ranked, evidence, &self.config);
        let risk_factors =
            explain::risk_factors(findings, novelty.is_zero_day, evidence.report, &self.config);
        let signal = match ranked.first() {
            Some(&(index, _)) => evidence.layout.category(index).label(),
            None if !findings.is_empty() => "heuristic rules",
            None => "the model baseline",
        };
        let model_decision =
            explain::model_decision(label, label_confidence, confidence, signal, novelty.is_zero_day);

        debug!(
            %label,
            confidence,
            label_confidence,
            probability = p,
            zero_day = novelty.is_zero_day,
            findings = findings.len(),
            "Fused verdict"
        );

        Verdict {
            label,
            confidence,
            label_confidence,
            is_zero_day: novelty.is_zero_day,
            explanation: Explanation {
                feature_importance,
                suspicious_bytes,
                model_decision,
                confidence_breakdown: breakdown,
                risk_factors,
            },
            classifier_probability: classifier.probability,
            novelty_score: novelty.score,
            model_fingerprint: self.model_fingerprint.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FeatureConfig, HeuristicsConfig};
    use crate::features::{Extraction, FeatureExtractor};

    fn fuser() -> Fuser {
        Fuser::new(
            FusionConfig::default(),
            HeuristicsConfig::default().severity_saturation,
        )
    }

    fn novelty(score: f64, zero_day: bool) -> NoveltyScore {
        NoveltyScore {
            score,
            threshold: 0.5,
            is_zero_day: zero_day,
            isolation: score,
            envelope_excess: 0.0,
        }
    }

    fn finding(severity: Severity, offset: usize) -> HeuristicFinding {
        HeuristicFinding {
            rule_id: format!("r{offset}"),
            description: format!("rule at {offset}"),
            severity,
            offset,
            matched: b"abc".to_vec(),
        }
    }

    fn extraction(data: &[u8]) -> (FeatureExtractor, Extraction) {
        let ex = FeatureExtractor::new(FeatureConfig::default());
        let e = ex.extract_bytes(data).unwrap();
        (ex, e)
    }

    fn score(p: f32, contributions: Vec<f32>) -> ClassifierScore {
        ClassifierScore {
            probability: p,
            logit: 0.0,
            contributions,
        }
    }

    #[test]
    fn label_policy() {
        let f = fuser();
        assert_eq!(f.label(0.5, &[]), Label::Malicious);
        assert_eq!(f.label(0.4, &[]), Label::Suspicious);
        assert_eq!(f.label(0.36, &[]), Label::Suspicious);
        assert_eq!(f.label(0.2, &[]), Label::Benign);
        assert_eq!(f.label(0.2, &[finding(Severity::High, 0)]), Label::Suspicious);
        assert_eq!(f.label(0.2, &[finding(Severity::Medium, 0)]), Label::Benign);
        assert_eq!(f.label(0.9, &[finding(Severity::Low, 0)]), Label::Malicious);
    }

    #[test]
    fn confidence_monotone_in_probability() {
        let f = fuser();
        let n = novelty(0.45, false);
        let findings = [finding(Severity::Medium, 3)];
        let mut last = -1.0;
        for i in 0..=100 {
            let p = i as f64 / 100.0;
            let c = f.breakdown(p, &n, &findings).sum().clamp(0.0, 1.0);
            assert!(c >= last, "p={p} c={c} last={last}");
            last = c;
        }
    }

    #[test]
    fn label_confidence_tracks_distance_from_boundary() {
        let f = fuser();
        let benign: Vec<f64> = [0.3, 0.2, 0.1, 0.02]
            .iter()
            .map(|&p| f.label_confidence(p, Label::Benign, &[]))
            .collect();
        assert!(benign.windows(2).all(|w| w[0] < w[1]), "{benign:?}");
        assert!(benign[3] > 0.95);
        assert_eq!(f.label_confidence(1.0, Label::Malicious, &[]), 1.0);
        assert_eq!(f.label_confidence(0.5, Label::Malicious, &[]), 0.5);
        assert!(
            f.label_confidence(0.1, Label::Suspicious, &[finding(Severity::High, 0)])
                > f.label_confidence(0.4, Label::Suspicious, &[])
        );

        let data = vec![0u8; 4096];
        let (ex, e) = extraction(&data);
        let evidence = Evidence {
            bytes: &data,
            vector: &e.vector,
            report: &e.report,
            layout: ex.layout(),
        };
        let v = f.fuse(&score(0.018, vec![0.0; 1000]), &novelty(0.2, false), &[], &evidence);
        assert_eq!(v.label, Label::Benign);
        assert!(v.label_confidence > 0.95, "{}", v.label_confidence);
        assert!(v.confidence < 0.05, "{}", v.confidence);
        assert!(v.explanation.model_decision.starts_with("Classified as benign with 97% confidence (threat score 0%)"));
    }

    #[test]
    fn zero_day_does_not_change_label() {
        let data = vec![7u8; 2048];
        let (ex, e) = extraction(&data);
        let evidence = Evidence {
            bytes: &data,
            vector: &e.vector,
            report: &e.report,
            layout: ex.layout(),
        };
        let f = fuser();
        let v = f.fuse(&score(0.05, vec![0.0; 1000]), &novelty(2.0, true), &[], &evidence);
        assert_eq!(v.label, Label::Benign);
        assert!(v.is_zero_day);
        assert!(v.explanation.model_decision.contains("zero-day"));
        assert!(v.explanation.risk_factors.iter().any(|r| r.contains("zero-day")));
        assert!(v.explanation.feature_importance.is_empty());
        assert!(v.explanation.model_decision.contains("the model baseline"));

        let v = f.fuse(&score(0.95, vec![0.0; 1000]), &novelty(0.3, false), &[], &evidence);
        assert_eq!(v.label, Label::Malicious);
        assert!(!v.is_zero_day);
    }

    #[test]
    fn importance_top_k_sorted() {
        let data: Vec<u8> = (0..4096u32).map(|i| (i % 251) as u8).collect();
        let (ex, e) = extraction(&data);
        let evidence = Evidence {
            bytes: &data,
            vector: &e.vector,
            report: &e.report,
            layout: ex.layout(),
        };
        let contributions: Vec<f32> = (0..1000).map(|i| ((i * 37) % 101) as f32 - 50.0).collect();
        let v = fuser().fuse(&score(0.7, contributions), &novelty(0.4, false), &[], &evidence);
        let fi = &v.explanation.feature_importance;
        assert_eq!(fi.len(), 10);
        assert_eq!(fi[0].importance, 1.0);
        assert!(fi.windows(2).all(|w| w[0].importance >= w[1].importance));
        assert!(v.explanation.suspicious_bytes.len() <= 10);
    }

    #[test]
    fn findings_lead_suspicious_bytes_and_risks() {
        let data = vec![0x41u8; 1024];
        let (ex, e) = extraction(&data);
        let evidence = Evidence {
            bytes: &data,
            vector: &e.vector,
            report: &e.report,
            layout: ex.layout(),
        };
        let findings = [finding(Severity::High, 10), finding(Severity::Low, 40)];
        let v = fuser().fuse(&score(0.1, vec![0.0; 1000]), &novelty(0.1, false), &findings, &evidence);
        assert_eq!(v.label, Label::Suspicious);
        let sb = &v.explanation.suspicious_bytes;
        assert_eq!(sb[0].offset, 10);
        assert_eq!(sb[0].byte_sequence, "616263");
        assert_eq!(sb[0].confidence, 1.0);
        assert_eq!(v.explanation.risk_factors, vec!["rule at 10", "rule at 40"]);
        assert!(v.explanation.model_decision.contains("heuristic rules"));
    }
}
