//! Centralized module for hashing.
//!
//! Cryptographic digests identify artifacts and model files; the FNV-1a
//! function buckets n-grams. FNV is used instead of `std`'s `DefaultHasher`
//! because bucket assignment must be identical across processes and releases.

use sha2::{Digest, Sha256};

const FNV_OFFSET_BASIS: u32 = 0x811c_9dc5;
const FNV_PRIME: u32 = 0x0100_0193;

/// Computes the SHA-256 digest of the given data and returns it as a hex string.
pub fn sha256_digest(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Computes the BLAKE3 digest of the given data and returns it as a hex string.
pub fn blake3_digest(data: &[u8]) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(data);
    hasher.finalize().to_hex().to_string()
}

/// 32-bit FNV-1a over a short byte window.
#[inline]
pub fn fnv1a32(window: &[u8]) -> u32 {
    let mut h = FNV_OFFSET_BASIS;
    for &b in window {
        h ^= b as u32;
        h = h.wrapping_mul(FNV_PRIME);
    }
    h
}

/// Bucket index of a window for a power-of-two bucket count.
#[inline]
pub fn bucket_of(window: &[u8], buckets: usize) -> usize {
    debug_assert!(buckets.is_power_of_two());
    (fnv1a32(window) as usize) & (buckets - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_input() {
        assert_eq!(
            sha256_digest(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_eq!(
            blake3_digest(b""),
            "af1349b9f5f9a1a6a0404dea36dcc9499bcb25c9adc112b7cc9a93cae41f3262"
        );
    }

    #[test]
    fn test_fnv_reference_values() {
        // Published FNV-1a 32-bit test vectors
        assert_eq!(fnv1a32(b""), 0x811c9dc5);
        assert_eq!(fnv1a32(b"a"), 0xe40c292c);
        assert_eq!(fnv1a32(b"foobar"), 0xbf9cf968);
    }

    #[test]
    fn test_bucket_in_range() {
        for a in 0..=255u8 {
            let b = bucket_of(&[a, a.wrapping_add(7)], 256);
            assert!(b < 256);
        }
    }
}
