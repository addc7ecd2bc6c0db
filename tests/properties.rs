//! Property tests for spec §8's P1 (MPHF bijection), P2 (static function
//! value round-trip), and P6 (serialize/deserialize round-trip) over random
//! key sets, complementing the concrete scenarios in `tests/scenarios.rs`
//! and the white-box invariant checks inline in `src/peel.rs`/`src/mphf.rs`.

use std::collections::HashSet;

use mphf_core::{serialize, FunctionBuilder, IdentityBytes, MphfBuilder};
use proptest::collection::hash_set as prop_hash_set;
use proptest::prelude::*;

/// Bounds the random key-set size so a proptest run (20-ish cases, each
/// spinning up a bucketed build) finishes quickly without starving the
/// bucketed-store path of interesting sizes to exercise.
fn key_set_strategy() -> impl Strategy<Value = Vec<String>> {
    prop_hash_set("[a-z]{1,12}", 1..400).prop_map(|set| set.into_iter().collect())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(20))]

    /// P1: for any set of distinct keys, the built `Mphf` is a bijection
    /// onto `[0, n)`.
    #[test]
    fn p1_mphf_is_a_bijection_onto_0_n(keys in key_set_strategy()) {
        let refs: Vec<&str> = keys.iter().map(String::as_str).collect();
        let dir = tempfile::tempdir().unwrap();
        let builder = MphfBuilder::new(IdentityBytes, dir.path());
        let (mphf, _stats) = builder.build(&refs, None).unwrap();

        prop_assert_eq!(mphf.len(), refs.len() as u64);
        let mut seen = HashSet::new();
        for k in &refs {
            let r = mphf.rank(&IdentityBytes, *k);
            prop_assert!(r < refs.len() as u64);
            prop_assert!(seen.insert(r));
        }
    }

    /// P2: for any set of distinct keys paired with arbitrary `width`-bit
    /// values, the built `StaticFunction` returns exactly the value each key
    /// was assigned.
    #[test]
    fn p2_static_function_preserves_assigned_values(
        keys in key_set_strategy(),
        width in 1u8..33,
    ) {
        let refs: Vec<&str> = keys.iter().map(String::as_str).collect();
        let mask: u64 = if width == 64 { u64::MAX } else { (1u64 << width) - 1 };
        let values: Vec<u64> = (0..refs.len() as u64)
            .map(|i| i.wrapping_mul(2_654_435_761) & mask)
            .collect();

        let dir = tempfile::tempdir().unwrap();
        let builder = FunctionBuilder::new(IdentityBytes, dir.path());
        let items: Vec<(&str, u64)> = refs.iter().copied().zip(values.iter().copied()).collect();
        let (func, _stats) = builder.build(&items, width, None).unwrap();

        for (k, &v) in refs.iter().zip(values.iter()) {
            prop_assert_eq!(func.get(&IdentityBytes, *k), v);
        }
    }

    /// P6: serializing then deserializing an `Mphf` preserves every key's
    /// rank exactly.
    #[test]
    fn p6_mphf_serialize_round_trips(keys in key_set_strategy()) {
        let refs: Vec<&str> = keys.iter().map(String::as_str).collect();
        let dir = tempfile::tempdir().unwrap();
        let builder = MphfBuilder::new(IdentityBytes, dir.path());
        let (mphf, _stats) = builder.build(&refs, None).unwrap();

        let mut buf = Vec::new();
        serialize::write_mphf(&mut buf, &mphf).unwrap();
        let restored = serialize::read_mphf(&mut buf.as_slice()).unwrap();

        prop_assert_eq!(restored.len(), mphf.len());
        for k in &refs {
            prop_assert_eq!(
                restored.rank(&IdentityBytes, *k),
                mphf.rank(&IdentityBytes, *k)
            );
        }
    }
}
