//! C6 — MPHFRanker: wraps the GOV3 construction in a `w = 2` labeling that
//! turns [`crate::function`]'s static-function machinery into a bijection
//! `key -> [0, n)` (spec §4.6).
//!
//! Per DESIGN.md "GF2/GF3 role split" this module, not [`crate::function`],
//! is the consumer of the mod-3 hinge formula spec §4.5's literal text
//! describes: each hyperedge picks one of its three vertices as its
//! "hinge" — for peeled edges, the vertex peeling itself resolved; for
//! edges left in the unpeeled core, a vertex chosen by a bipartite matching
//! over the core (`match_core_hinges`) so every core edge still gets an
//! exclusive hinge distinct from every other edge's — and
//! [`crate::gf3::Gf3System`] assigns 2-bit labels so
//! `(label[v0]+label[v1]+label[v2]) mod 3` recovers that vertex's position
//! within the edge. A hinge vertex whose solved label is `0` is bumped to
//! the sentinel `3` (equal to `0 mod 3`, so the query-time selector is
//! unaffected) purely so the succinct rank index can tell "this slot is a
//! key's hinge" apart from "this slot is untouched filler" by a single
//! nonzero-pair test.
//!
//! Has no teacher counterpart: `ARyaskov-minimal_perfect_hash`'s `Mphf`
//! reads `g[]` directly with `(ga+gb+gc) % n` and carries no succinct rank
//! structure, because it never bucket-partitions in the first place.

use std::path::Path;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::bits::{PackedValues, RankIndex};
use crate::error::BuildError;
use crate::function::BuildStats;
use crate::gf3::Gf3System;
use crate::hash::{self, Signature};
use crate::key::KeyAdapter;
use crate::peel::{derive_edge, peel, Arity, GovEdge, PeelScratch};
use crate::store::{log_buckets_for, BucketedHashStore};

const SEED_STEP: u64 = 1 << 56;
const OFFSET_MASK: u64 = SEED_STEP - 1;
const MAX_OUTER_RESEEDS: u32 = 3;
const LABEL_WIDTH: u8 = 2;

#[inline]
fn pack_offset(offset: u64, local_seed: u8) -> u64 {
    (offset & OFFSET_MASK) | ((local_seed as u64) << 56)
}

#[inline]
fn unpack_offset(word: u64) -> (u64, u8) {
    (word & OFFSET_MASK, (word >> 56) as u8)
}

#[inline]
fn reseed(attempt: u32) -> u64 {
    if attempt == 0 {
        0
    } else {
        hash::hash(&attempt.to_le_bytes(), 0x9C6B_3F17_AA05_7E41).word(0)
    }
}

/// Builds a [`Mphf`] over a key adapter (spec §4.6 "During construction").
pub struct MphfBuilder<A> {
    transform: A,
    temp_dir: std::path::PathBuf,
    memory_limit_bytes: usize,
}

impl<A> MphfBuilder<A> {
    pub fn new(transform: A, temp_dir: impl AsRef<Path>) -> Self {
        Self {
            transform,
            temp_dir: temp_dir.as_ref().to_path_buf(),
            memory_limit_bytes: crate::store::DEFAULT_MEMORY_LIMIT_BYTES,
        }
    }

    pub fn with_memory_limit(mut self, bytes: usize) -> Self {
        self.memory_limit_bytes = bytes;
        self
    }
}

impl<A, K: ?Sized> MphfBuilder<A>
where
    A: KeyAdapter<K>,
{
    /// Builds the minimal perfect hash over `keys` (spec §4.6). `cancel`, if
    /// given, is polled between buckets (spec §5 cancellation).
    pub fn build(
        &self,
        keys: &[&K],
        cancel: Option<&dyn Fn() -> bool>,
    ) -> Result<(Mphf, BuildStats), BuildError> {
        let n = keys.len() as u64;
        let mut stats = BuildStats::default();

        if n == 0 {
            return Ok((
                Mphf {
                    global_seed: 0,
                    log_buckets: 0,
                    edge_offset: vec![0],
                    values: PackedValues::new(0, LABEL_WIDTH),
                    rank: RankIndex::build(&PackedValues::new(0, LABEL_WIDTH)),
                    n: 0,
                },
                stats,
            ));
        }

        let log_buckets = log_buckets_for(n);
        let num_buckets = 1u32 << log_buckets;

        let mut outer_attempt = 0u32;
        let (global_seed, mut store) = loop {
            let seed = reseed(outer_attempt);
            let mut store =
                BucketedHashStore::new(&self.transform, &self.temp_dir)?
                    .with_memory_limit(self.memory_limit_bytes);
            store.reset_with_buckets(seed, log_buckets);
            for &key in keys {
                let bytes = self.transform.to_bytes(key);
                let sig = hash::hash(&bytes, seed);
                store.push_signature(sig)?;
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
            break (seed, store);
        };

        let metas = store.bucket_metas();
        let mut cum = vec![0u64; num_buckets as usize + 1];
        for (i, meta) in metas.iter().enumerate() {
            cum[i + 1] = cum[i] + meta.size as u64;
        }
        debug_assert_eq!(cum[num_buckets as usize], n);

        let total_vertices = Arity::Three.bucket_span(log_buckets, 0, n).1 as usize;
        let mut values = PackedValues::new(total_vertices, LABEL_WIDTH);
        let mut edge_offset = vec![0u64; num_buckets as usize + 1];
        let mut vstarts = vec![0u64; num_buckets as usize];

        let mut jobs: Vec<Option<(Vec<Signature>, u32)>> = Vec::with_capacity(num_buckets as usize);
        for b in 0..num_buckets as usize {
            let off_b = cum[b];
            let off_b1 = cum[b + 1];
            edge_offset[b] = pack_offset(off_b, 0);
            if off_b1 == off_b {
                jobs.push(None);
                continue;
            }
            let (vstart, vend) = Arity::Three.bucket_span(log_buckets, off_b, off_b1);
            vstarts[b] = vstart;
            let sigs = store.read_bucket(b as u32)?;
            jobs.push(Some((sigs, (vend - vstart) as u32)));
        }

        if let Some(cancel) = cancel {
            if cancel() {
                return Err(BuildError::Cancelled);
            }
        }

        #[cfg(feature = "parallel")]
        let solved: Vec<Option<Result<(u8, Vec<u64>, u64, u64), BuildError>>> = jobs
            .into_par_iter()
            .map(|job| job.map(|(sigs, m)| solve_bucket(&sigs, m)))
            .collect();

        #[cfg(not(feature = "parallel"))]
        let solved: Vec<Option<Result<(u8, Vec<u64>, u64, u64), BuildError>>> = jobs
            .into_iter()
            .map(|job| job.map(|(sigs, m)| solve_bucket(&sigs, m)))
            .collect();

        for (b, slot) in solved.into_iter().enumerate() {
            let Some(result) = slot else { continue };
            let (s, labels, undirectable, unsolvable) = result?;
            stats.undirectable += undirectable;
            stats.unsolvable += unsolvable;
            edge_offset[b] = pack_offset(cum[b], s);
            let vstart = vstarts[b] as usize;
            for (i, v) in labels.into_iter().enumerate() {
                values.set(vstart + i, v);
            }
        }

        edge_offset[num_buckets as usize] = pack_offset(n, 0);

        let rank = RankIndex::build(&values);
        Ok((Mphf { global_seed, log_buckets, edge_offset, values, rank, n }, stats))
    }
}

/// Finds a system of distinct representatives for the unpeeled core: one
/// incident vertex per core edge, no vertex claimed by two edges. Without
/// this, two core edges sharing a vertex would both be free to designate it
/// their hinge, colliding onto the same rank (spec §8 P1). Returns `None`
/// if no such matching exists for this local seed; the caller retries with
/// the next one, same as a GF(3)-unsolvable core.
///
/// `visited` is caller-owned scratch, cleared before each augmenting-path
/// search, so repeated calls across local seeds don't reallocate.
fn match_core_hinges(
    core_edges: &[u32],
    edges: &[GovEdge],
    match_of_vertex: &mut [i64],
    visited: &mut [bool],
) -> Option<Vec<(u32, u32, u8)>> {
    match_of_vertex.fill(-1);
    for &eid in core_edges {
        visited.fill(false);
        if !try_augment(eid, edges, match_of_vertex, visited) {
            return None;
        }
    }

    let mut matching = Vec::with_capacity(core_edges.len());
    for (v, &matched) in match_of_vertex.iter().enumerate() {
        if matched >= 0 {
            let eid = matched as u32;
            let verts = edges[eid as usize].as_slice();
            let pos = verts.iter().position(|&x| x as usize == v).expect("matched vertex must belong to its edge");
            matching.push((eid, v as u32, pos as u8));
        }
    }
    Some(matching)
}

/// Kuhn's algorithm augmenting-path step: try to give edge `eid` a vertex
/// not already claimed, bumping whichever edge holds it to a different one
/// of its own vertices if needed.
fn try_augment(eid: u32, edges: &[GovEdge], match_of_vertex: &mut [i64], visited: &mut [bool]) -> bool {
    for &v in edges[eid as usize].as_slice() {
        let v = v as usize;
        if !visited[v] {
            visited[v] = true;
            let holder = match_of_vertex[v];
            if holder < 0 || try_augment(holder as u32, edges, match_of_vertex, visited) {
                match_of_vertex[v] = eid as i64;
                return true;
            }
        }
    }
    false
}

/// Peels, and if necessary falls back to [`Gf3System`] for, one bucket,
/// computing the mod-3 hinge label for every vertex and bumping hinge
/// vertices whose label solved to `0` up to the sentinel `3` (spec §4.6).
/// Pure function of its inputs so it can run on any worker thread.
fn solve_bucket(sigs: &[Signature], m: u32) -> Result<(u8, Vec<u64>, u64, u64), BuildError> {
    let mut scratch = PeelScratch::new();
    let mut match_of_vertex = vec![-1i64; m as usize];
    let mut visited = vec![false; m as usize];
    let mut undirectable = 0u64;
    let mut unsolvable = 0u64;

    for s in 0u16..256 {
        let s = s as u8;
        let edges: Vec<GovEdge> =
            sigs.iter().map(|sig| derive_edge(sig, s, m, Arity::Three)).collect();
        let outcome = peel(&edges, m, &mut scratch);

        let mut labels = vec![0u8; m as usize];
        // (vertex index within bucket, hinge position) per edge.
        let mut hinges: Vec<(usize, u8)> = vec![(0, 0); sigs.len()];

        if !outcome.acyclic() {
            undirectable += 1;
            let Some(matching) = match_core_hinges(&outcome.core_edges, &edges, &mut match_of_vertex, &mut visited)
            else {
                log::debug!("bucket local seed {s} has no core hinge matching, retrying");
                continue;
            };

            // Every vertex touched by a core edge but not claimed as some
            // edge's hinge must solve to exactly `0`, or the rank index's
            // nonzero-pair test would mistake it for a hinge too.
            let mut is_hinge = vec![false; m as usize];
            for &(_, v, _) in &matching {
                is_hinge[v as usize] = true;
            }
            let mut touched = vec![false; m as usize];
            for &eid in &outcome.core_edges {
                for &v in edges[eid as usize].as_slice() {
                    touched[v as usize] = true;
                }
            }

            let mut sys = Gf3System::new(m);
            for &(eid, _v, pos) in &matching {
                sys.push(edges[eid as usize].as_slice(), pos);
            }
            for v in 0..m as usize {
                if touched[v] && !is_hinge[v] {
                    sys.push(&[v as u32], 0);
                }
            }

            match sys.solve_lazy() {
                Some(sol) => {
                    for (v, &t) in sol.iter().enumerate() {
                        labels[v] = t;
                    }
                }
                None => {
                    unsolvable += 1;
                    log::debug!("bucket local seed {s} left an unsolvable GF(3) core, retrying");
                    continue;
                }
            }
            for &(eid, v, pos) in &matching {
                hinges[eid as usize] = (v as usize, pos);
            }
        }

        // Back-substitute peeled edges in reverse discovery order, each
        // solving for exactly its own pivot vertex so the mod-3 sum of the
        // edge equals `rec.pivot` (spec §4.6).
        for rec in outcome.order.iter().rev() {
            let verts = edges[rec.edge as usize].as_slice();
            let mut acc = rec.pivot as i16;
            for (i, &v) in verts.iter().enumerate() {
                if i != rec.pivot as usize {
                    acc -= labels[v as usize] as i16;
                }
            }
            labels[rec.vertex as usize] = acc.rem_euclid(3) as u8;
            hinges[rec.edge as usize] = (rec.vertex as usize, rec.pivot);
        }

        // Mark every edge's hinge vertex with the `3` sentinel when its
        // solved label is `0`, so the rank index's nonzero-pair test counts
        // it (spec §4.6: "receives label 3 instead of 0").
        for (v, _pos) in hinges {
            if labels[v] == 0 {
                labels[v] = 3;
            }
        }

        let values = labels.into_iter().map(|l| l as u64).collect();
        return Ok((s, values, undirectable, unsolvable));
    }

    log::warn!("exhausted all 256 local seeds for a bucket of {} keys", sigs.len());
    Err(BuildError::SeedExhausted)
}

/// A finalized, read-only minimal perfect hash function: `key -> [0, n)`
/// (spec §4.6). Query-time is `O(1)`, lock-free, and requires no suspension
/// points (spec §5).
#[derive(Clone, Debug)]
pub struct Mphf {
    global_seed: u64,
    log_buckets: u32,
    edge_offset: Vec<u64>,
    values: PackedValues,
    rank: RankIndex,
    n: u64,
}

impl Mphf {
    pub fn len(&self) -> u64 {
        self.n
    }

    pub fn is_empty(&self) -> bool {
        self.n == 0
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

    pub(crate) fn rank_index(&self) -> &RankIndex {
        &self.rank
    }

    pub(crate) fn from_parts(
        global_seed: u64,
        log_buckets: u32,
        edge_offset: Vec<u64>,
        values: PackedValues,
        n: u64,
    ) -> Self {
        let rank = RankIndex::build(&values);
        Self { global_seed, log_buckets, edge_offset, values, rank, n }
    }

    /// The hinge-vertex index (absolute, across the whole `values` array)
    /// and the signature used to derive it — shared by [`rank`](Self::rank)
    /// and [`SignedMphf`].
    fn locate(&self, bytes: &[u8]) -> (u64, Signature) {
        let sig = hash::hash(bytes, self.global_seed);
        let b = sig.bucket(self.log_buckets) as usize;
        let (off_b, s) = unpack_offset(self.edge_offset[b]);
        let (off_b1, _) = unpack_offset(self.edge_offset[b + 1]);
        let (vstart, vend) = Arity::Three.bucket_span(self.log_buckets, off_b, off_b1);
        let m = (vend - vstart) as u32;
        let edge = derive_edge(&sig, s, m, Arity::Three);
        let verts = edge.as_slice();
        let i = ((self.values.get(vstart as usize + verts[0] as usize)
            + self.values.get(vstart as usize + verts[1] as usize)
            + self.values.get(vstart as usize + verts[2] as usize))
            % 3) as usize;
        (vstart + verts[i] as u64, sig)
    }

    /// `rank(key) -> [0, n)` (spec §4.6 query). Out-of-set keys return an
    /// unspecified index in range unless wrapped by [`SignedMphf`].
    pub fn rank<K: ?Sized>(&self, transform: &impl KeyAdapter<K>, key: &K) -> u64 {
        if self.is_empty() {
            return u64::MAX;
        }
        let bytes = transform.to_bytes(key);
        let (h, _sig) = self.locate(&bytes);
        self.rank.rank(&self.values, h as usize)
    }
}

/// Width, in bits, of the per-key fingerprint [`SignedMphf`] attaches so
/// out-of-set queries miss with probability `2^-w` instead of returning an
/// arbitrary in-range index (spec §1, §6's "Optional ... signature list").
#[cfg(feature = "signatures")]
pub const DEFAULT_SIGNATURE_WIDTH: u8 = 16;

/// An [`Mphf`] plus a `w_sig`-bit fingerprint per key, indexed by the MPHF's
/// own output (spec §4.2 `signatures(width, pl)`, §6 "Optional: signature
/// width + packed signatures", §7 "false positives into misses"). Query
/// recomputes the same fingerprint hash and compares against the one stored
/// at `mphf.rank(key)`, matching spec §9's "Signature attachment" design
/// note.
#[cfg(feature = "signatures")]
#[derive(Clone, Debug)]
pub struct SignedMphf {
    mphf: Mphf,
    sig_width: u8,
    fingerprints: PackedValues,
}

#[cfg(feature = "signatures")]
impl SignedMphf {
    pub fn len(&self) -> u64 {
        self.mphf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mphf.is_empty()
    }

    pub fn inner(&self) -> &Mphf {
        &self.mphf
    }

    pub fn sig_width(&self) -> u8 {
        self.sig_width
    }

    pub(crate) fn fingerprints(&self) -> &PackedValues {
        &self.fingerprints
    }

    pub(crate) fn from_parts(mphf: Mphf, sig_width: u8, fingerprints: PackedValues) -> Self {
        Self { mphf, sig_width, fingerprints }
    }

    #[inline]
    fn fingerprint_of(&self, sig: &Signature) -> u64 {
        let width = self.sig_width.min(64);
        if width == 0 {
            0
        } else if width >= 64 {
            sig.word(1)
        } else {
            sig.word(1) & ((1u64 << width) - 1)
        }
    }

    /// `get(key) -> Option<[0,n)>`: `None` for any key outside the input
    /// set, with false-positive probability `<= 2^-w_sig` (spec P7).
    pub fn get<K: ?Sized>(&self, transform: &impl KeyAdapter<K>, key: &K) -> Option<u64> {
        if self.is_empty() {
            return None;
        }
        let bytes = transform.to_bytes(key);
        let (h, sig) = self.mphf.locate(&bytes);
        let idx = self.mphf.rank.rank(&self.mphf.values, h as usize);
        let expect = self.fingerprint_of(&sig);
        let stored = self.fingerprints.get(idx as usize);
        (stored == expect).then_some(idx)
    }
}

#[cfg(feature = "signatures")]
impl<A> MphfBuilder<A> {
    /// Builds a [`SignedMphf`]: an [`Mphf`] plus a `sig_width`-bit
    /// fingerprint per key (spec §4.2's `signatures` operation), by
    /// re-deriving each key's signature under the finished structure's
    /// global seed and truncating word 1 to `sig_width` bits.
    pub fn build_signed<K: ?Sized>(
        &self,
        keys: &[&K],
        sig_width: u8,
        cancel: Option<&dyn Fn() -> bool>,
    ) -> Result<(SignedMphf, BuildStats), BuildError>
    where
        A: KeyAdapter<K>,
    {
        let (mphf, stats) = self.build(keys, cancel)?;
        let mut fingerprints = PackedValues::new(mphf.len() as usize, sig_width.max(1));
        for &key in keys {
            let bytes = self.transform.to_bytes(key);
            let (h, sig) = mphf.locate(&bytes);
            let idx = mphf.rank.rank(&mphf.values, h as usize);
            let width = sig_width.min(64);
            let fp = if width == 0 {
                0
            } else if width >= 64 {
                sig.word(1)
            } else {
                sig.word(1) & ((1u64 << width) - 1)
            };
            fingerprints.set(idx as usize, fp);
        }
        Ok((SignedMphf { mphf, sig_width, fingerprints }, stats))
    }
}
