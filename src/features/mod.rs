//! Byte-level feature extraction.
//!
//! [`FeatureExtractor::extract`] turns an artifact into a fixed-length
//! [`FeatureVector`] (see [`layout`] for the slot map) plus an
//! [`ExtractionReport`] with the auxiliary values the explainer needs to map
//! features back to byte offsets.

pub mod content;
pub mod layout;
pub mod ngram;
pub mod structure;

pub use layout::{FeatureCategory, FeatureLayout};
pub use structure::{parse_structure, FormatKind, StructuralDescriptors, Structure};

use crate::artifact::RawArtifact;
use crate::config::FeatureConfig;
use crate::entropy::{segment_entropies, Histogram, MAX_ENTROPY};
use crate::error::{Result, ScanError};
use serde::{Deserialize, Serialize};
use std::ops::{Deref, Range};
use std::sync::Arc;
use tracing::{debug, info};

/// Fixed-length vector of normalized features.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureVector(Vec<f32>);

impl FeatureVector {
    /// Wrap raw values. Used for model training and tests; the extractor is
    /// the only producer in the scan path.
    pub fn from_values(values: Vec<f32>) -> Self {
        Self(values)
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn into_inner(self) -> Vec<f32> {
        self.0
    }
}

impl Deref for FeatureVector {
    type Target = [f32];

    fn deref(&self) -> &[f32] {
        &self.0
    }
}

/// Auxiliary descriptors computed alongside the vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionReport {
    pub byte_len: usize,
    /// Global entropy in bits per byte.
    pub global_entropy: f64,
    /// Segment length used for local entropy.
    pub segment_len: usize,
    /// Entropy of each segment in bits per byte.
    pub segment_entropies: Vec<f64>,
    pub structure: Structure,
}

impl ExtractionReport {
    /// Byte range of local entropy segment `index`.
    pub fn segment_range(&self, index: usize) -> Range<usize> {
        let start = (index * self.segment_len).min(self.byte_len);
        start..(start + self.segment_len).min(self.byte_len)
    }
}

/// Vector and report for one artifact.
#[derive(Debug, Clone)]
pub struct Extraction {
    pub vector: FeatureVector,
    pub report: ExtractionReport,
}

/// Feature extractor for a fixed layout.
#[derive(Debug, Clone)]
pub struct FeatureExtractor {
    config: FeatureConfig,
    layout: Arc<FeatureLayout>,
}

impl FeatureExtractor {
    pub fn new(config: FeatureConfig) -> Self {
        let layout = FeatureLayout::new(&config);
        if layout.computed_len != config.feature_size {
            info!(
                computed = layout.computed_len,
                feature_size = config.feature_size,
                "Feature layout length differs from FEATURE_SIZE; vectors are padded or truncated"
            );
        }
        Self {
            config,
            layout: Arc::new(layout),
        }
    }

    pub fn layout(&self) -> &Arc<FeatureLayout> {
        &self.layout
    }

    pub fn feature_size(&self) -> usize {
        self.config.feature_size
    }

    /// Extract features from an artifact.
    pub fn extract(&self, artifact: &RawArtifact) -> Result<Extraction> {
        self.extract_bytes(artifact.bytes())
    }

    /// Extract features from a raw buffer.
    pub fn extract_bytes(&self, data: &[u8]) -> Result<Extraction> {
        if data.is_empty() {
            return Err(ScanError::EmptyInput);
        }
        let cfg = &self.config;
        let layout = &self.layout;
        let mut v = vec![0.0f32; layout.computed_len];

        let hist = Histogram::from_bytes(data);
        for (slot, freq) in v[layout.byte_freq.clone()]
            .iter_mut()
            .zip(hist.frequencies())
        {
            *slot = freq as f32;
        }

        v[layout.bigram.clone()]
            .copy_from_slice(&ngram::ngram_frequencies(data, 2, cfg.bigram_buckets));
        v[layout.trigram.clone()]
            .copy_from_slice(&ngram::ngram_frequencies(data, 3, cfg.trigram_buckets));

        let global_entropy = hist.entropy();
        v[layout.global_entropy] = (global_entropy / MAX_ENTROPY) as f32;

        let segments = segment_entropies(data, cfg.local_entropy_slots, cfg.min_entropy_window);
        for (slot, e) in v[layout.local_entropy.clone()]
            .iter_mut()
            .zip(segments.entropies.iter())
        {
            *slot = (e / MAX_ENTROPY) as f32;
        }
        let summary = [
            segments.max() / MAX_ENTROPY,
            segments.min() / MAX_ENTROPY,
            (segments.std_dev() / 4.0).min(1.0),
            segments.high_ratio(cfg.high_entropy_threshold),
        ];
        for (slot, s) in v[layout.entropy_summary.clone()].iter_mut().zip(summary) {
            *slot = s as f32;
        }

        v[layout.content.clone()].copy_from_slice(&content::content_stats(data, &hist));

        let structure = parse_structure(data);
        v[layout.structure.clone()].copy_from_slice(&structure.to_slots(data.len()));

        v.resize(cfg.feature_size, 0.0);
        debug!(
            bytes = data.len(),
            entropy = global_entropy,
            format = ?structure.format(),
            "Extracted features"
        );

        Ok(Extraction {
            vector: FeatureVector(v),
            report: ExtractionReport {
                byte_len: data.len(),
                global_entropy,
                segment_len: segments.segment_len,
                segment_entropies: segments.entropies,
                structure,
            },
        })
    }
}
