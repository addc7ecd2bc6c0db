use mphf_core::{IdentityBytes, MphfBuilder};
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use std::collections::HashSet;
use std::time::Instant;

const N_KEYS: usize = 1_000_000;
const GEN_SEED: u64 = 42;

fn main() {
    println!("--- mphf_core million_build ---");
    println!("n = {N_KEYS}");

    let t0 = Instant::now();
    let keys = gen_unique_keys(N_KEYS, GEN_SEED);
    let gen_s = t0.elapsed().as_secs_f64();
    println!("gen:    {:>8.3} s   ({:.1} M keys/s)", gen_s, N_KEYS as f64 / gen_s / 1e6);

    let key_refs: Vec<&[u8]> = keys.iter().map(|k| k.as_slice()).collect();
    let dir = tempfile::tempdir().expect("create temp dir for bucket spill");
    let builder = MphfBuilder::new(IdentityBytes, dir.path());

    let t1 = Instant::now();
    let (mphf, stats) = builder.build(&key_refs, None).expect("build minimal perfect hash");
    let build_s = t1.elapsed().as_secs_f64();
    println!("build:  {:>8.3} s   ({:.1} M keys/s)", build_s, N_KEYS as f64 / build_s / 1e6);
    println!(
        "stats:  undirectable={} unsolvable={} outer_reseeds={}",
        stats.undirectable, stats.unsolvable, stats.outer_reseeds
    );

    let t2 = Instant::now();
    let mut acc: u64 = 0;
    for chunk in key_refs.chunks(32_768) {
        for k in chunk {
            acc ^= mphf.rank(&IdentityBytes, *k);
        }
    }
    let lookup_s = t2.elapsed().as_secs_f64();
    println!("lookup: {:>8.3} s   ({:.1} M lookups/s)   (acc={acc})", lookup_s, N_KEYS as f64 / lookup_s / 1e6);

    let mut seen = vec![false; N_KEYS];
    for k in &key_refs {
        let r = mphf.rank(&IdentityBytes, *k) as usize;
        assert!(r < N_KEYS, "rank out of range");
        assert!(!seen[r], "rank collision: not a bijection");
        seen[r] = true;
    }
    println!("verified: bijection onto [0, {N_KEYS})");

    println!("----------------------------------------------");
    println!("Total (gen + build + lookup): {:.3} s", gen_s + build_s + lookup_s);
}

/// Generate N unique 16-byte keys (raw bytes), deterministically.
fn gen_unique_keys(n: usize, seed: u64) -> Vec<Vec<u8>> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut set = HashSet::with_capacity(n * 2);
    let mut keys = Vec::with_capacity(n);
    while keys.len() < n {
        let mut buf = [0u8; 16];
        rng.fill_bytes(&mut buf);
        if set.insert(buf) {
            keys.push(buf.to_vec());
        }
    }
    keys
}
