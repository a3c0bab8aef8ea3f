use criterion::{black_box, criterion_group, criterion_main, Criterion};
use reputation_core::bloom::BloomFilter;
use reputation_core::IPKey;

fn insert_n(n: u64, target_fpr: f64) -> BloomFilter {
    let filter = BloomFilter::for_capacity(n, target_fpr, 42).unwrap();
    (0..n).for_each(|key| filter.insert(IPKey(key as u128)));
    filter
}

fn might_contain(f: &BloomFilter) -> bool {
    f.might_contain(IPKey(0))
}

fn criterion_benchmark(c: &mut Criterion) {
    c.bench_function("insert_n 10_000, fpr=0.01", |b| {
        b.iter(|| insert_n(black_box(10_000), black_box(0.01)))
    });
    c.bench_function("insert_n 2_000_000, fpr=0.01", |b| {
        b.iter(|| insert_n(black_box(2_000_000), black_box(0.01)))
    });
    let small_filter = insert_n(10_000, 0.01);
    c.bench_function("might_contain 0 on 10k (small filter)", |b| {
        b.iter(|| might_contain(black_box(&small_filter)))
    });
    let big_filter = insert_n(2_000_000, 0.01);
    c.bench_function("might_contain 0 on 2m (big filter)", |b| {
        b.iter(|| might_contain(black_box(&big_filter)))
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
