//! C1 — Hasher: deterministic, seed-parameterised 256-bit signature of a
//! key, the identity every downstream component keys off of.
//!
//! Generalizes the teacher's `KeyHash` (three independent `xxh3_64`
//! lanes derived from seed-split constants) to spec §4.1's four-word
//! signature by running the wider `xxh3_128` twice with complementary
//! seeds, the crate-level analogue of "a 128-bit mixing hash run twice
//! with complementary seeds".

use xxhash_rust::xxh3::{xxh3_128_with_seed, Xxh3};

/// A key's identity throughout the core: four 64-bit words produced by
/// [`hash`]. Equality of two signatures is treated as a key collision.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Signature(pub [u64; 4]);

impl Signature {
    /// Top `b` bits of word 0 — the bucket index under a `2^b`-way split.
    #[inline]
    pub fn bucket(&self, log_buckets: u32) -> u32 {
        if log_buckets == 0 {
            0
        } else {
            (self.0[0] >> (64 - log_buckets)) as u32
        }
    }

    #[inline]
    pub fn word(&self, i: usize) -> u64 {
        self.0[i]
    }
}

/// Compute the 4-word signature of `bytes` under `seed`. Deterministic, no
/// failure modes.
#[inline]
pub fn hash(bytes: &[u8], seed: u64) -> Signature {
    let lo = xxh3_128_with_seed(bytes, seed);
    let hi = xxh3_128_with_seed(bytes, !seed);
    Signature([
        (lo & 0xFFFF_FFFF_FFFF_FFFF) as u64,
        (lo >> 64) as u64,
        (hi & 0xFFFF_FFFF_FFFF_FFFF) as u64,
        (hi >> 64) as u64,
    ])
}

/// Streaming variant for keys exposed only as a byte iterator (the
/// `toBits`/`toBytes` key-adapter path, spec §6). Folds xxh3's incremental
/// hasher over the stream and derives the same two complementary-seeded
/// 128-bit lanes.
pub fn hash_iter<I: IntoIterator<Item = u8>>(bytes: I, seed: u64) -> Signature {
    let buf: Vec<u8> = bytes.into_iter().collect();
    let mut h = Xxh3::with_seed(seed);
    h.update(&buf);
    let lo = h.digest128();
    let mut h2 = Xxh3::with_seed(!seed);
    h2.update(&buf);
    let hi = h2.digest128();
    Signature([
        (lo & 0xFFFF_FFFF_FFFF_FFFF) as u64,
        (lo >> 64) as u64,
        (hi & 0xFFFF_FFFF_FFFF_FFFF) as u64,
        (hi >> 64) as u64,
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic() {
        let a = hash(b"hello world", 42);
        let b = hash(b"hello world", 42);
        assert_eq!(a, b);
    }

    #[test]
    fn seed_changes_output() {
        let a = hash(b"hello world", 42);
        let b = hash(b"hello world", 43);
        assert_ne!(a, b);
    }

    #[test]
    fn bucket_prefix_extraction() {
        let sig = Signature([0xF000_0000_0000_0000, 0, 0, 0]);
        assert_eq!(sig.bucket(4), 0xF);
        assert_eq!(sig.bucket(0), 0);
    }

    #[test]
    fn streaming_matches_whole_slice() {
        let whole = hash(b"abcdefgh", 7);
        let streamed = hash_iter(b"abcdefgh".iter().copied(), 7);
        assert_eq!(whole, streamed);
    }
}
