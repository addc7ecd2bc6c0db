//! C5 — FunctionAssembler: glues C1/C2/C3/C4 into a static function
//! `key -> w-bit value` (spec §4.5).
//!
//! Per DESIGN.md "GF2/GF3 role split", the general static function uses
//! classical XOR (MWHC) assignment — `values[v0] ^ values[v1] ^ values[v2]
//! == target` — solved on the residual core via [`crate::gf2::Gf2System`],
//! generalizing teacher `bdz.rs::try_build_bdz`'s `g[x] = edge_id ^ g[y] ^
//! g[z]` reconstruction from a single whole-keyset pass to a per-bucket
//! build with a real fallback for the unpeeled core (the teacher has no
//! fallback at all — an unpeelable keyset there is simply a failed build).

use std::path::Path;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::bits::PackedValues;
use crate::error::BuildError;
use crate::gf2::Gf2System;
use crate::hash::{self, Signature};
use crate::key::KeyAdapter;
use crate::peel::{derive_edge, peel, Arity, GovEdge, PeelScratch};
use crate::store::{log_buckets_for, BucketedHashStore};

const SEED_STEP: u64 = 1 << 56;
const OFFSET_MASK: u64 = SEED_STEP - 1;
const MAX_OUTER_RESEEDS: u32 = 3;

#[inline]
fn pack_offset(offset: u64, local_seed: u8) -> u64 {
    (offset & OFFSET_MASK) | ((local_seed as u64) << 56)
}

#[inline]
fn unpack_offset(word: u64) -> (u64, u8) {
    (word & OFFSET_MASK, (word >> 56) as u8)
}

/// Build-time configuration (spec §5 resource model: memory-bounded C2).
#[derive(Clone, Debug)]
pub struct BuildConfig {
    pub memory_limit_bytes: usize,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self { memory_limit_bytes: crate::store::DEFAULT_MEMORY_LIMIT_BYTES }
    }
}

/// Observability counters for conditions that are recovered locally rather
/// than surfaced as errors (spec §7: "observable only through counters").
#[derive(Clone, Copy, Debug, Default)]
pub struct BuildStats {
    /// Buckets where C3 peeling left a non-empty core (had to fall back
    /// to C4 at all).
    pub undirectable: u64,
    /// C4 attempts that returned "unsolvable" and forced a local-seed bump.
    pub unsolvable: u64,
    /// Outer (global-seed) reseeds performed due to in-bucket duplicate
    /// signatures.
    pub outer_reseeds: u32,
}

/// Builds a [`StaticFunction`] from a key adapter and a set of
/// `(key, value)` pairs (spec §4.5 "Build").
pub struct FunctionBuilder<A> {
    transform: A,
    temp_dir: std::path::PathBuf,
    config: BuildConfig,
    arity: Arity,
}

impl<A> FunctionBuilder<A> {
    pub fn new(transform: A, temp_dir: impl AsRef<Path>) -> Self {
        Self {
            transform,
            temp_dir: temp_dir.as_ref().to_path_buf(),
            config: BuildConfig::default(),
            arity: Arity::Three,
        }
    }

    pub fn with_config(mut self, config: BuildConfig) -> Self {
        self.config = config;
        self
    }

    /// Selects GOV4 (4-uniform) edges instead of the GOV3 default.
    pub fn with_arity(mut self, arity: Arity) -> Self {
        self.arity = arity;
        self
    }
}

impl<A, K: ?Sized> FunctionBuilder<A>
where
    A: KeyAdapter<K>,
{
    /// Builds a function mapping each `items[i].0` to `items[i].1`, an
    /// arbitrary `width`-bit value (spec §4.5 / P2). `cancel`, if given, is
    /// polled between buckets (spec §5 cancellation).
    pub fn build(
        &self,
        items: &[(&K, u64)],
        width: u8,
        cancel: Option<&dyn Fn() -> bool>,
    ) -> Result<(StaticFunction, BuildStats), BuildError> {
        let n = items.len() as u64;
        let mut stats = BuildStats::default();

        if n == 0 {
            return Ok((
                StaticFunction {
                    global_seed: 0,
                    log_buckets: 0,
                    arity: self.arity,
                    width,
                    edge_offset: vec![0],
                    values: PackedValues::new(0, width.max(1)),
                },
                stats,
            ));
        }

        let log_buckets = log_buckets_for(n);
        let num_buckets = 1u32 << log_buckets;

        let mut outer_attempt = 0u32;
        let (global_seed, mut store, mut bucket_values) = loop {
            let seed = reseed(outer_attempt);
            let mut store =
                BucketedHashStore::new(&self.transform, &self.temp_dir)?
                    .with_memory_limit(self.config.memory_limit_bytes);
            store.reset_with_buckets(seed, log_buckets);
            let mut bucket_values: Vec<Vec<u64>> =
                (0..num_buckets).map(|_| Vec::new()).collect();

            for &(key, value) in items {
                let bytes = self.transform.to_bytes(key);
                let sig = hash::hash(&bytes, seed);
                let idx = sig.bucket(log_buckets) as usize;
                store.push_signature(sig)?;
                bucket_values[idx].push(value);
            }

            if store.has_duplicates()? {
                outer_attempt += 1;
                stats.outer_reseeds += 1;
                log::debug!("duplicate signatures in bucket store, reseeding (attempt {outer_attempt})");
                if outer_attempt > MAX_OUTER_RESEEDS {
                    return Err(BuildError::InputDuplicates(outer_attempt));
                }
                continue;
            }

            store.close_and_partition(log_buckets)?;
            break (seed, store, bucket_values.split_off(0));
        };

        let metas = store.bucket_metas();
        let mut cum = vec![0u64; num_buckets as usize + 1];
        for (i, meta) in metas.iter().enumerate() {
            cum[i + 1] = cum[i] + meta.size as u64;
        }
        debug_assert_eq!(cum[num_buckets as usize], n);

        let total_vertices = self.arity.bucket_span(log_buckets, 0, n).1 as usize;
        let mut values = PackedValues::new(total_vertices, width.max(1));
        let mut edge_offset = vec![0u64; num_buckets as usize + 1];
        let mut vstarts = vec![0u64; num_buckets as usize];

        // Read every non-empty bucket's signatures sequentially (C2's bucket
        // store is a single `&mut self` reader), then hand the CPU-bound
        // peel/solve work for each bucket to an independent job — buckets
        // are fully decoupled once read, per spec §5's concurrency model.
        let mut jobs: Vec<Option<BucketJob>> = Vec::with_capacity(num_buckets as usize);
        for b in 0..num_buckets as usize {
            let off_b = cum[b];
            let off_b1 = cum[b + 1];
            edge_offset[b] = pack_offset(off_b, 0);
            if off_b1 == off_b {
                jobs.push(None);
                continue;
            }
            let (vstart, vend) = self.arity.bucket_span(log_buckets, off_b, off_b1);
            vstarts[b] = vstart;
            let sigs = store.read_bucket(b as u32)?;
            let targets = std::mem::take(&mut bucket_values[b]);
            jobs.push(Some(BucketJob { m: (vend - vstart) as u32, sigs, targets }));
        }

        if let Some(cancel) = cancel {
            if cancel() {
                return Err(BuildError::Cancelled);
            }
        }

        let arity = self.arity;

        #[cfg(feature = "parallel")]
        let solved: Vec<Option<Result<(u8, Vec<u64>, u64, u64), BuildError>>> = jobs
            .into_par_iter()
            .map(|job| job.map(|j| solve_bucket(&j.sigs, &j.targets, j.m, arity, width)))
            .collect();

        #[cfg(not(feature = "parallel"))]
        let solved: Vec<Option<Result<(u8, Vec<u64>, u64, u64), BuildError>>> = jobs
            .into_iter()
            .map(|job| job.map(|j| solve_bucket(&j.sigs, &j.targets, j.m, arity, width)))
            .collect();

        for (b, slot) in solved.into_iter().enumerate() {
            let Some(result) = slot else { continue };
            let (s, local_values, undirectable, unsolvable) = result?;
            stats.undirectable += undirectable;
            stats.unsolvable += unsolvable;
            edge_offset[b] = pack_offset(cum[b], s);
            let vstart = vstarts[b] as usize;
            for (i, v) in local_values.into_iter().enumerate() {
                values.set(vstart + i, v);
            }
        }

        edge_offset[num_buckets as usize] = pack_offset(n, 0);

        Ok((
            StaticFunction { global_seed, log_buckets, arity: self.arity, width, edge_offset, values },
            stats,
        ))
    }
}

/// One bucket's CPU-bound input: its signatures and supplied target
/// values, sized to `m` vertices. Read sequentially from [`BucketedHashStore`]
/// (I/O, single-threaded) but solved independently of every other bucket
/// (spec §5: "buckets are fully independent once C2 has emitted them").
struct BucketJob {
    m: u32,
    sigs: Vec<Signature>,
    targets: Vec<u64>,
}

/// Peels, and if necessary falls back to [`Gf2System`] for, one bucket,
/// trying local seeds `0..256` (spec §4.3's retry policy) until one
/// produces a solvable assignment. Pure function of its inputs so it can
/// run on any worker thread without shared mutable state.
fn solve_bucket(
    sigs: &[Signature],
    targets: &[u64],
    m: u32,
    arity: Arity,
    width: u8,
) -> Result<(u8, Vec<u64>, u64, u64), BuildError> {
    let mut scratch = PeelScratch::new();
    let mut undirectable = 0u64;
    let mut unsolvable = 0u64;

    for s in 0u16..256 {
        let s = s as u8;
        let edges: Vec<GovEdge> = sigs.iter().map(|sig| derive_edge(sig, s, m, arity)).collect();
        let outcome = peel(&edges, m, &mut scratch);

        let mut local_values = if outcome.acyclic() {
            vec![0u64; m as usize]
        } else {
            undirectable += 1;
            let mut sys = Gf2System::new(m);
            for &eid in &outcome.core_edges {
                sys.push(edges[eid as usize].as_slice(), targets[eid as usize]);
            }
            match sys.solve_lazy(width.max(1)) {
                Some(sol) => sol,
                None => {
                    unsolvable += 1;
                    log::debug!("bucket local seed {s} left an unsolvable GF(2) core, retrying");
                    continue;
                }
            }
        };

        for rec in outcome.order.iter().rev() {
            let verts = edges[rec.edge as usize].as_slice();
            let target = targets[rec.edge as usize];
            let mut acc = target;
            for (i, &v) in verts.iter().enumerate() {
                if i != rec.pivot as usize {
                    acc ^= local_values[v as usize];
                }
            }
            local_values[rec.vertex as usize] = acc;
        }

        return Ok((s, local_values, undirectable, unsolvable));
    }

    log::warn!("exhausted all 256 local seeds for a bucket of {} keys", sigs.len());
    Err(BuildError::SeedExhausted)
}

fn reseed(attempt: u32) -> u64 {
    if attempt == 0 {
        0
    } else {
        hash::hash(&attempt.to_le_bytes(), 0xD1B5_4A32_D192_ED03).word(0)
    }
}

/// A finalized, read-only static function: `key -> w-bit value` (spec
/// §4.5). Query-time is `O(1)`, lock-free, and requires no suspension
/// points (spec §5).
#[derive(Clone, Debug)]
pub struct StaticFunction {
    global_seed: u64,
    log_buckets: u32,
    arity: Arity,
    width: u8,
    edge_offset: Vec<u64>,
    values: PackedValues,
}

impl StaticFunction {
    pub fn len(&self) -> u64 {
        self.edge_offset.last().map(|&w| unpack_offset(w).0).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn width(&self) -> u8 {
        self.width
    }

    pub fn arity(&self) -> Arity {
        self.arity
    }

    pub fn global_seed(&self) -> u64 {
        self.global_seed
    }

    pub fn log_buckets(&self) -> u32 {
        self.log_buckets
    }

    pub(crate) fn edge_offset_words(&self) -> &[u64] {
        &self.edge_offset
    }

    pub(crate) fn values(&self) -> &PackedValues {
        &self.values
    }

    pub(crate) fn from_parts(
        global_seed: u64,
        log_buckets: u32,
        arity: Arity,
        width: u8,
        edge_offset: Vec<u64>,
        values: PackedValues,
    ) -> Self {
        Self { global_seed, log_buckets, arity, width, edge_offset, values }
    }

    /// Returns the hinge-vertex index for `sig` without interpreting the
    /// value — the query path [`crate::mphf`] needs this, not the XOR
    /// output, which is why it is exposed `pub(crate)` separately from
    /// [`get`](Self::get).
    pub(crate) fn locate<K: ?Sized>(&self, bytes: &[u8]) -> (u32, GovEdge) {
        let sig = hash::hash(bytes, self.global_seed);
        let b = sig.bucket(self.log_buckets) as usize;
        let (off_b, s) = unpack_offset(self.edge_offset[b]);
        let (off_b1, _) = unpack_offset(self.edge_offset[b + 1]);
        let (vstart, vend) = self.arity.bucket_span(self.log_buckets, off_b, off_b1);
        let m = (vend - vstart) as u32;
        let edge = derive_edge(&sig, s, m, self.arity);
        (vstart as u32, edge)
    }

    /// `get(key) -> w-bit value`, spec §4.5 query. Out-of-set keys return
    /// an unspecified value unless the function is signed (see
    /// `get_signed`, §7 `QueryOnEmpty`); this crate does not ship a
    /// built-in signature check (left to a signed wrapper, spec §6).
    pub fn get<K: ?Sized>(&self, transform: &impl KeyAdapter<K>, key: &K) -> u64 {
        if self.is_empty() {
            return u64::MAX;
        }
        let bytes = transform.to_bytes(key);
        let (vstart, edge) = self.locate::<K>(&bytes);
        let verts = edge.as_slice();
        let mut acc = 0u64;
        for &v in verts {
            acc ^= self.values.get(vstart as usize + v as usize);
        }
        acc
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::IdentityBytes;

    fn build_owned(
        keys: &[&'static str],
        values: &[u64],
        width: u8,
    ) -> (StaticFunction, BuildStats) {
        let dir = tempfile::tempdir().unwrap();
        let builder = FunctionBuilder::new(IdentityBytes, dir.path());
        let items: Vec<(&str, u64)> =
            keys.iter().copied().zip(values.iter().copied()).collect();
        builder.build(&items, width, None).unwrap()
    }

    #[test]
    fn tiny_function_reproduces_supplied_values() {
        let keys = ["a", "b", "c", "d", "e", "f", "g", "h", "i", "j"];
        let values: Vec<u64> = (0..10).map(|i| i * 7 % 13).collect();
        let (func, _stats) = build_owned(&keys, &values, 8);
        for (k, &v) in keys.iter().zip(values.iter()) {
            assert_eq!(func.get(&IdentityBytes, *k), v);
        }
    }

    #[test]
    fn empty_build_yields_zero_length_function() {
        let dir = tempfile::tempdir().unwrap();
        let builder = FunctionBuilder::new(IdentityBytes, dir.path());
        let items: Vec<(&str, u64)> = Vec::new();
        let (func, _stats) = builder.build(&items, 8, None).unwrap();
        assert!(func.is_empty());
        assert_eq!(func.get(&IdentityBytes, "anything"), u64::MAX);
    }

    #[test]
    fn singleton_function_resolves_its_one_key() {
        let (func, _stats) = build_owned(&["only"], &[42], 8);
        assert_eq!(func.get(&IdentityBytes, "only"), 42);
    }

    #[test]
    fn wide_values_round_trip() {
        let keys: Vec<&'static str> =
            vec!["k0", "k1", "k2", "k3", "k4", "k5", "k6", "k7", "k8", "k9", "k10", "k11"];
        let values: Vec<u64> = (0..keys.len() as u64).map(|i| i * 1_000_003).collect();
        let (func, _stats) = build_owned(&keys, &values, 32);
        for (k, &v) in keys.iter().zip(values.iter()) {
            assert_eq!(func.get(&IdentityBytes, *k), v);
        }
    }
}
