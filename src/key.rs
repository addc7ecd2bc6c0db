//! Key adapter (spec §6, "input side"). The core consumes keys through a
//! small trait rather than hard-coding a byte or string type; text
//! encodings, Hu-Tucker transforms, and other order-preserving strategies
//! are external collaborators that can implement this trait — this crate
//! ships only the identity byte-view.

use std::borrow::Cow;

/// Adapts a caller's key type to the byte view the core hashes, plus a
/// self-description size used for accounting (`numBits`, spec §6).
pub trait KeyAdapter<K: ?Sized> {
    fn to_bytes<'a>(&self, key: &'a K) -> Cow<'a, [u8]>;
    fn num_bits(&self, key: &K) -> u64;
}

/// Identity adapter: the key's own bytes, unmodified. Used by every test
/// and example in this crate. Monotone, order-preserving transforms
/// (Elias-Fano-friendly encodings, Hu-Tucker, UTF-16/32 canonicalization)
/// are explicitly out of scope (spec §1) and live outside this crate.
#[derive(Clone, Copy, Debug, Default)]
pub struct IdentityBytes;

impl KeyAdapter<[u8]> for IdentityBytes {
    #[inline]
    fn to_bytes<'a>(&self, key: &'a [u8]) -> Cow<'a, [u8]> {
        Cow::Borrowed(key)
    }

    #[inline]
    fn num_bits(&self, key: &[u8]) -> u64 {
        key.len() as u64 * 8
    }
}

impl KeyAdapter<str> for IdentityBytes {
    #[inline]
    fn to_bytes<'a>(&self, key: &'a str) -> Cow<'a, [u8]> {
        Cow::Borrowed(key.as_bytes())
    }

    #[inline]
    fn num_bits(&self, key: &str) -> u64 {
        key.len() as u64 * 8
    }
}

/// A monotone MPHF's distributor contract (spec §6): a client external to
/// this crate maps `key -> bucket index of size 2^k`, and composes with one
/// [`crate::function::FunctionBuilder`] instance as the within-bucket
/// offset function. No implementation lives here — only the seam a
/// downstream crate (Elias-Fano list, Jacobson balanced parentheses,
/// hollow/PaCo/z-fast trie) builds against.
pub trait Distributor<K: ?Sized> {
    /// Maps `key` to a bucket index in `[0, 2^bucket_bits)`.
    fn bucket_of(&self, key: &K) -> u64;
    /// `log2` of the (uniform) bucket size this distributor assumes.
    fn bucket_bits(&self) -> u32;
}
