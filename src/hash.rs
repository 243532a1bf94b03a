//! Seeded 64-bit hashing used by every sketch in the crate.
//!
//! All sketches hash through xxh64 with explicit seeds so that two runs with
//! the same seeds see identical placements. Row families (e.g. the Count-Min
//! rows) are derived by offsetting one base seed with per-row bias values
//! drawn at construction.

use std::hash::Hasher;

use twox_hash::XxHash64;

/// Seeded xxh64 of a byte key.
#[inline]
pub(crate) fn hash_bytes(key: &[u8], seed: u64) -> u64 {
    let mut hasher = XxHash64::with_seed(seed);
    hasher.write(key);
    hasher.finish()
}

/// Seeded hash mapped onto the open unit interval.
///
/// The top 53 bits are kept and the result is offset by half an ulp, so the
/// value is strictly inside (0, 1) and `ln` of it is always finite.
#[inline]
pub(crate) fn unit_hash(key: &[u8], seed: u64) -> f64 {
    let scale = 1.0 / (1u64 << 53) as f64;
    ((hash_bytes(key, seed) >> 11) as f64 + 0.5) * scale
}
