//! mphf_core — the hypergraph/linear-system core of a static and minimal
//! perfect hash function library.
//!
//! Given `n` distinct keys, builds a bijection onto `[0, n)` ([`Mphf`]) or
//! an arbitrary-width static function `key -> value` ([`StaticFunction`]),
//! scaling to key sets larger than memory by partitioning into disk-backed
//! buckets (`BucketedHashStore`) and solving each bucket with random
//! 3-/4-uniform hypergraph peeling (MWHC / GOV3 / GOV4), falling back to
//! lazy Gaussian elimination over GF(2) or GF(3) when peeling alone leaves
//! a non-empty core.
//!
//! Text ingestion, CLI parsing, and the Elias-Fano/trie-based monotone
//! distributors that compose on top of this core are out of scope — see
//! [`key::Distributor`] for the seam a downstream crate builds against.

pub mod bits;
pub mod error;
pub mod function;
pub mod gf2;
pub mod gf3;
pub mod hash;
pub mod key;
pub mod mphf;
pub mod peel;
pub mod serialize;
pub mod solver;
pub mod store;

pub use error::BuildError;
pub use function::{BuildStats, FunctionBuilder, StaticFunction};
pub use hash::Signature;
pub use key::{Distributor, IdentityBytes, KeyAdapter};
pub use mphf::{Mphf, MphfBuilder};
pub use peel::Arity;
pub use store::BucketedHashStore;

#[cfg(feature = "signatures")]
pub use mphf::SignedMphf;
