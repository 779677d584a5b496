//! Explanation assembly.
//!
//! Attribution scores are turned into a ranked feature list, then the
//! strongest byte-level features are mapped back to offsets in the artifact
//! so a reviewer can inspect the bytes behind the decision.

use super::verdict::{FeatureImportance, Label, SuspiciousByte};
use crate::config::FusionConfig;
use crate::features::ngram::first_window_in_bucket;
use crate::features::{ExtractionReport, FeatureCategory, FeatureLayout, FeatureVector};
use crate::heuristics::{HeuristicFinding, Severity};
use std::collections::HashSet;

/// Everything the explainer needs besides the three analysis results.
#[derive(Debug, Clone, Copy)]
pub struct Evidence<'a> {
    pub bytes: &'a [u8],
    pub vector: &'a FeatureVector,
    pub report: &'a ExtractionReport,
    pub layout: &'a FeatureLayout,
}

/// Feature indices with a non-zero contribution, strongest first. Ties keep
/// index order.
pub(crate) fn ranked_features(contributions: &[f32]) -> Vec<(usize, f32)> {
    let mut ranked: Vec<(usize, f32)> = contributions
        .iter()
        .copied()
        .enumerate()
        .filter(|(_, c)| *c != 0.0 && c.is_finite())
        .collect();
    ranked.sort_by(|a, b| b.1.abs().total_cmp(&a.1.abs()).then(a.0.cmp(&b.0)));
    ranked
}

pub(crate) fn feature_importance(
    ranked: &[(usize, f32)],
    evidence: &Evidence<'_>,
    top_k: usize,
) -> Vec<FeatureImportance> {
    let Some(&(_, strongest)) = ranked.first() else {
        return Vec::new();
    };
    let max = strongest.abs() as f64;
    ranked
        .iter()
        .take(top_k)
        .map(|&(i, c)| {
            let value = evidence.vector.get(i).copied().unwrap_or(0.0);
            let direction = if c > 0.0 {
                "raises"
            } else {
                "lowers"
            };
            FeatureImportance {
                feature_name: evidence.layout.feature_name(i),
                importance: (c.abs() as f64 / max).clamp(0.0, 1.0),
                description: format!(
                    "{}; {direction} the malicious score",
                    evidence.layout.describe(i, value)
                ),
            }
        })
        .collect()
}

fn severity_confidence(severity: Severity) -> f64 {
    severity.weight() as f64 / Severity::High.weight() as f64
}

fn hex_at(bytes: &[u8], offset: usize, len: usize) -> String {
    let end = offset.saturating_add(len).min(bytes.len());
    hex::encode(&bytes[offset.min(end)..end])
}

/// Map one attributed feature back to an offset in the artifact.
fn locate_feature(index: usize, evidence: &Evidence<'_>) -> Option<(usize, String)> {
    let data = evidence.bytes;
    let report = evidence.report;
    let (category, pos) = evidence.layout.locate(index)?;
    match category {
        FeatureCategory::LocalEntropy => {
            let entropy = *report.segment_entropies.get(pos)?;
            let range = report.segment_range(pos);
            (!range.is_empty()).then(|| {
                (
                    range.start,
                    format!(
                        "Segment {pos} (0x{:x}-0x{:x}) has entropy {entropy:.2} bits per byte",
                        range.start, range.end
                    ),
                )
            })
        }
        FeatureCategory::Bigram | FeatureCategory::Trigram => {
            let (n, buckets) = if category == FeatureCategory::Bigram {
                (2, evidence.layout.bigram.len())
            } else {
                (3, evidence.layout.trigram.len())
            };
            let offset = first_window_in_bucket(data, n, buckets, pos)?;
            Some((
                offset,
                format!("First occurrence of a {n}-gram pattern weighted by the model (bucket {pos})"),
            ))
        }
        FeatureCategory::ByteFrequency => {
            let byte = u8::try_from(pos).ok()?;
            let offset = memchr::memchr(byte, data)?;
            Some((
                offset,
                format!("First occurrence of byte 0x{byte:02x}, whose frequency is weighted by the model"),
            ))
        }
        _ => None,
    }
}

/// Heuristic matches first, then byte regions behind the strongest positive
/// attributions; de-duplicated by offset.
pub(crate) fn suspicious_bytes(
    findings: &[HeuristicFinding],
    ranked: &[(usize, f32)],
    evidence: &Evidence<'_>,
    config: &FusionConfig,
) -> Vec<SuspiciousByte> {
    let limit = config.max_suspicious_bytes;
    let mut seen = HashSet::new();
    let mut out = Vec::new();

    for f in findings {
        if out.len() >= limit {
            return out;
        }
        if !seen.insert(f.offset) {
            continue;
        }
        out.push(SuspiciousByte {
            offset: f.offset,
            byte_sequence: hex::encode(&f.matched),
            confidence: severity_confidence(f.severity),
            reason: f.description.clone(),
        });
    }

    let max = ranked.first().map_or(0.0, |&(_, c)| c.abs() as f64);
    for &(index, c) in ranked.iter().filter(|(_, c)| *c > 0.0) {
        if out.len() >= limit {
            break;
        }
        let Some((offset, reason)) = locate_feature(index, evidence) else {
            continue;
        };
        if !seen.insert(offset) {
            continue;
        }
        out.push(SuspiciousByte {
            offset,
            byte_sequence: hex_at(evidence.bytes, offset, config.byte_context),
            confidence: if max > 0.0 { c as f64 / max } else { 0.0 },
            reason,
        });
    }
    out
}

pub(crate) fn risk_factors(
    findings: &[HeuristicFinding],
    is_zero_day: bool,
    report: &ExtractionReport,
    config: &FusionConfig,
) -> Vec<String> {
    let mut factors: Vec<String> = findings.iter().map(|f| f.description.clone()).collect();
    if is_zero_day {
        factors.push("Feature profile lies outside the benign training distribution (possible zero-day)".to_string());
    }
    if report.global_entropy > config.packed_entropy_threshold {
        factors.push(format!(
            "High entropy ({:.2} bits per byte) suggests packing or encryption",
            report.global_entropy
        ));
    }
    factors
}

pub(crate) fn model_decision(
    label: Label,
    label_confidence: f64,
    threat: f64,
    signal: &str,
    is_zero_day: bool,
) -> String {
    let mut text = format!(
        "Classified as {label} with {:.0}% confidence (threat score {:.0}%); the strongest signal came from {signal}.",
        label_confidence * 100.0,
        threat * 100.0
    );
    if is_zero_day {
        text.push_str(" The artifact is also flagged as a likely zero-day threat.");
    }
    text
}
