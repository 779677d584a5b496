//! Core entropy calculation primitives.

/// Calculates the Shannon entropy of a byte slice in bits per byte.
///
/// Returns a value between 0.0 and 8.0:
/// - 0.0 when every byte has the same value (or the slice is empty)
/// - 8.0 for a perfectly uniform byte distribution
#[inline]
pub fn shannon_entropy(data: &[u8]) -> f64 {
    Histogram::from_bytes(data).entropy()
}

/// Byte-value histogram shared by frequency features and entropy.
#[derive(Debug, Clone)]
pub struct Histogram {
    counts: [u64; 256],
    total: u64,
}

impl Histogram {
    /// Creates a new empty histogram.
    #[inline]
    pub fn new() -> Self {
        Self {
            counts: [0; 256],
            total: 0,
        }
    }

    /// Creates a histogram from a byte slice in a single pass.
    #[inline]
    pub fn from_bytes(data: &[u8]) -> Self {
        let mut hist = Self::new();
        for &byte in data {
            hist.counts[byte as usize] += 1;
        }
        hist.total = data.len() as u64;
        hist
    }

    /// Count of one byte value.
    #[inline]
    pub fn count(&self, byte: u8) -> u64 {
        self.counts[byte as usize]
    }

    /// Number of distinct byte values present.
    pub fn distinct(&self) -> usize {
        self.counts.iter().filter(|&&c| c > 0).count()
    }

    /// Relative frequency of every byte value; sums to 1 for non-empty input.
    pub fn frequencies(&self) -> [f64; 256] {
        let mut out = [0.0f64; 256];
        if self.total == 0 {
            return out;
        }
        let total = self.total as f64;
        for (slot, &count) in out.iter_mut().zip(self.counts.iter()) {
            *slot = count as f64 / total;
        }
        out
    }

    /// Shannon entropy of the histogram. Zero-probability terms contribute 0.
    #[inline]
    pub fn entropy(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }

        let total = self.total as f64;
        let mut entropy = 0.0;

        for &count in &self.counts {
            if count == 0 {
                continue;
            }
            let p = (count as f64) / total;
            entropy -= p * p.log2();
        }

        // Rounding can leave -0.0 or a hair above 8
        entropy.clamp(0.0, 8.0)
    }

    /// Returns the total number of bytes in the histogram.
    #[inline]
    pub fn len(&self) -> u64 {
        self.total
    }

    /// Returns true if the histogram is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.total == 0
    }
}

impl Default for Histogram {
    fn default() -> Self {
        Self::new()
    }
}
