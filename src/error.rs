//! Error taxonomy (spec §7). Peeling failure and GF(2)/GF(3) `Unsolvable`
//! are recovered locally by seed-bumping and never reach this enum — they
//! are observable only through [`crate::function::BuildStats`] counters.

use thiserror::Error;

/// Fatal build-time errors. Query-time has no error conditions: lookups on
/// an empty or out-of-set key return the configured default (`QueryOnEmpty`
/// in spec terms), never a `Result`.
#[derive(Debug, Error)]
pub enum BuildError {
    /// C2 found equal signatures inside a bucket after three outer reseeds
    /// (spec §4.3's retry policy on duplicate-bucket detection).
    #[error("duplicate keys detected in input after {0} reseed attempts")]
    InputDuplicates(u32),

    /// C3+C4 could not solve some bucket with any of the 256 local seeds.
    /// Statistically below 1e-6 for a properly sized vertex ratio.
    #[error("no local seed (of 256) produced a solvable bucket")]
    SeedExhausted,

    /// Any disk/temp-file error surfaced by C2. Not retried internally.
    #[error("I/O error during bucket spill/read: {0}")]
    Io(#[from] std::io::Error),

    /// The caller's cooperative cancellation check returned `true` between
    /// buckets.
    #[error("build cancelled")]
    Cancelled,
}
