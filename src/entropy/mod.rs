//! Entropy calculation primitives.
//!
//! - Shannon entropy and byte histograms ([`core`])
//! - Per-segment (local) entropy with offset mapping ([`window`])
//!
//! Entropy is always reported in bits per byte, so every value lies in
//! `[0, 8]`. Feature code divides by [`MAX_ENTROPY`] to normalize.

pub mod core;
pub mod window;

pub use self::core::{shannon_entropy, Histogram};
pub use self::window::{segment_entropies, SegmentEntropy};

/// Upper bound of byte entropy in bits.
pub const MAX_ENTROPY: f64 = 8.0;
