//! Local (segment) entropy.
//!
//! The buffer is cut into at most `slots` consecutive segments so that every
//! byte lands in exactly one segment and each slot can be mapped back to an
//! offset range of the original artifact.

use crate::entropy::core::shannon_entropy;
use std::ops::Range;

/// Entropy of consecutive segments of a buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentEntropy {
    /// Length of each segment in bytes (the last one may be shorter).
    pub segment_len: usize,
    /// Entropy per segment, in bits per byte.
    pub entropies: Vec<f64>,
}

impl SegmentEntropy {
    /// Returns the number of segments analyzed.
    pub fn len(&self) -> usize {
        self.entropies.len()
    }

    /// Returns true if no segments were analyzed.
    pub fn is_empty(&self) -> bool {
        self.entropies.is_empty()
    }

    /// Byte range covered by segment `index`, clipped to `data_len`.
    pub fn range(&self, index: usize, data_len: usize) -> Range<usize> {
        let start = (index * self.segment_len).min(data_len);
        let end = (start + self.segment_len).min(data_len);
        start..end
    }

    pub fn max(&self) -> f64 {
        self.entropies.iter().copied().fold(0.0, f64::max)
    }

    pub fn min(&self) -> f64 {
        self.entropies
            .iter()
            .copied()
            .reduce(f64::min)
            .unwrap_or(0.0)
    }

    pub fn mean(&self) -> f64 {
        if self.entropies.is_empty() {
            return 0.0;
        }
        self.entropies.iter().sum::<f64>() / self.entropies.len() as f64
    }

    /// Population standard deviation of the segment entropies.
    pub fn std_dev(&self) -> f64 {
        if self.entropies.is_empty() {
            return 0.0;
        }
        let mean = self.mean();
        let variance = self
            .entropies
            .iter()
            .map(|&x| (x - mean) * (x - mean))
            .sum::<f64>()
            / self.entropies.len() as f64;
        variance.sqrt()
    }

    /// Fraction of segments whose entropy is above `threshold`.
    pub fn high_ratio(&self, threshold: f64) -> f64 {
        if self.entropies.is_empty() {
            return 0.0;
        }
        let high = self.entropies.iter().filter(|&&e| e > threshold).count();
        high as f64 / self.entropies.len() as f64
    }
}

/// Split `data` into at most `slots` segments of equal length (never shorter
/// than `min_window`) and compute the entropy of each.
pub fn segment_entropies(data: &[u8], slots: usize, min_window: usize) -> SegmentEntropy {
    if data.is_empty() || slots == 0 {
        return SegmentEntropy {
            segment_len: min_window.max(1),
            entropies: Vec::new(),
        };
    }
    let segment_len = data.len().div_ceil(slots).max(min_window).max(1);
    let entropies = data
        .chunks(segment_len)
        .take(slots)
        .map(shannon_entropy)
        .collect();
    SegmentEntropy {
        segment_len,
        entropies,
    }
}
