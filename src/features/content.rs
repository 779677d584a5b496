//! Content statistics over the raw bytes.

use super::layout::CONTENT_SLOTS;
use crate::entropy::Histogram;

/// Shortest printable run counted as a string.
const MIN_STRING_LEN: usize = 4;
/// Strings per KiB at which the density slot saturates.
const STRING_DENSITY_SATURATION: f64 = 16.0;

#[inline]
fn is_printable(b: u8) -> bool {
    (0x20..=0x7e).contains(&b) || b == b'\t' || b == b'\n' || b == b'\r'
}

/// Compute the content statistics slots, every value in [0,1]:
/// printable ratio, code (non-printable) ratio, NUL ratio, high-bit ratio,
/// string density, log2(size)/32, longest zero run ratio, distinct byte ratio.
pub fn content_stats(data: &[u8], hist: &Histogram) -> [f32; CONTENT_SLOTS] {
    let mut out = [0.0f32; CONTENT_SLOTS];
    if data.is_empty() {
        return out;
    }
    let len = data.len() as f64;

    let mut printable = 0usize;
    let mut high_bit = 0usize;
    let mut strings = 0usize;
    let mut run = 0usize;
    let mut zero_run = 0usize;
    let mut longest_zero_run = 0usize;
    for &b in data {
        if is_printable(b) {
            printable += 1;
            run += 1;
        } else {
            if run >= MIN_STRING_LEN {
                strings += 1;
            }
            run = 0;
        }
        if b >= 0x80 {
            high_bit += 1;
        }
        if b == 0 {
            zero_run += 1;
            longest_zero_run = longest_zero_run.max(zero_run);
        } else {
            zero_run = 0;
        }
    }
    if run >= MIN_STRING_LEN {
        strings += 1;
    }

    let printable_ratio = printable as f64 / len;
    let per_kib = strings as f64 / (len / 1024.0);

    out[0] = printable_ratio as f32;
    out[1] = (1.0 - printable_ratio) as f32;
    out[2] = (hist.count(0) as f64 / len) as f32;
    out[3] = (high_bit as f64 / len) as f32;
    out[4] = (per_kib / STRING_DENSITY_SATURATION).min(1.0) as f32;
    out[5] = (len.log2() / 32.0).clamp(0.0, 1.0) as f32;
    out[6] = (longest_zero_run as f64 / len) as f32;
    out[7] = (hist.distinct() as f64 / 256.0) as f32;
    out
}
