//! Hashed n-gram statistics.
//!
//! Every window of `n` consecutive bytes is hashed with FNV-1a into one of a
//! power-of-two number of buckets. Counts are normalized by the number of
//! windows, so a buffer with at least `n` bytes yields a distribution that
//! sums to 1.

use crate::hashing::bucket_of;

/// Normalized bucket frequencies of all `n`-byte windows.
pub fn ngram_frequencies(data: &[u8], n: usize, buckets: usize) -> Vec<f32> {
    let mut counts = vec![0u32; buckets];
    if n == 0 || data.len() < n {
        return vec![0.0; buckets];
    }
    let windows = data.len() - n + 1;
    for w in data.windows(n) {
        counts[bucket_of(w, buckets)] += 1;
    }
    let total = windows as f64;
    counts
        .into_iter()
        .map(|c| (c as f64 / total) as f32)
        .collect()
}

/// Offset of the first `n`-byte window hashed into `bucket`.
pub fn first_window_in_bucket(data: &[u8], n: usize, buckets: usize, bucket: usize) -> Option<usize> {
    if n == 0 {
        return None;
    }
    data.windows(n).position(|w| bucket_of(w, buckets) == bucket)
}
