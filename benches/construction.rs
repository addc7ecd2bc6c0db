//! Construction and query micro-benchmarks for the GOV3 minimal perfect
//! hash and the general static function.

use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use mphf_core::{FunctionBuilder, IdentityBytes, MphfBuilder};

fn gen_keys(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("key-{i:08}")).collect()
}

fn bench_mphf_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("mphf_build");
    for &n in &[1_000usize, 10_000, 100_000] {
        let keys = gen_keys(n);
        let refs: Vec<&str> = keys.iter().map(String::as_str).collect();
        group.bench_function(format!("n={n}"), |b| {
            b.iter_batched(
                || tempfile::tempdir().unwrap(),
                |dir| {
                    let builder = MphfBuilder::new(IdentityBytes, dir.path());
                    black_box(builder.build(&refs, None).unwrap())
                },
                BatchSize::LargeInput,
            );
        });
    }
    group.finish();
}

fn bench_mphf_rank(c: &mut Criterion) {
    let n = 100_000;
    let keys = gen_keys(n);
    let refs: Vec<&str> = keys.iter().map(String::as_str).collect();
    let dir = tempfile::tempdir().unwrap();
    let builder = MphfBuilder::new(IdentityBytes, dir.path());
    let (mphf, _stats) = builder.build(&refs, None).unwrap();

    c.bench_function("mphf_rank/n=100000", |b| {
        let mut i = 0usize;
        b.iter(|| {
            let k = refs[i % refs.len()];
            i += 1;
            black_box(mphf.rank(&IdentityBytes, k))
        });
    });
}

fn bench_function_build(c: &mut Criterion) {
    let n = 100_000;
    let keys = gen_keys(n);
    let items: Vec<(&str, u64)> =
        keys.iter().map(String::as_str).zip((0..n as u64).map(|i| i * 7)).collect();

    c.bench_function("function_build/n=100000/w=32", |b| {
        b.iter_batched(
            || tempfile::tempdir().unwrap(),
            |dir| {
                let builder = FunctionBuilder::new(IdentityBytes, dir.path());
                black_box(builder.build(&items, 32, None).unwrap())
            },
            BatchSize::LargeInput,
        );
    });
}

criterion_group!(benches, bench_mphf_build, bench_mphf_rank, bench_function_build);
criterion_main!(benches);
