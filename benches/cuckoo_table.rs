// `slots_per_bucket` is fixed at 4 (Fan et al. 2014), unlike the
// draft this was benchmarked against, so only table size is varied here.
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use reputation_core::cuckoo::exact::{ExactKeyTable, ExactKeyTableConfig};
use reputation_core::cuckoo::ReputationEntry;
use reputation_core::IPKey;

fn insert_n(n: u64) -> ExactKeyTable<Vec<u8>> {
    let table: ExactKeyTable<Vec<u8>> = ExactKeyTable::new(
        ExactKeyTableConfig {
            initial_buckets: (n / 3).max(8),
            ..Default::default()
        },
        42,
    )
    .unwrap();
    for key in 0..n {
        table
            .insert(IPKey(key as u128), ReputationEntry::new(IPKey(key as u128), 0, None))
            .unwrap();
    }
    table
}

fn contains(table: &ExactKeyTable<Vec<u8>>) -> bool {
    table.contains(IPKey(0))
}

fn insert_bench_vary_n(c: &mut Criterion) {
    let mut group = c.benchmark_group("cuckoo::insert_varying_size");
    for n in [10_000, 100_000, 1_000_000] {
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, &n| {
            b.iter(|| insert_n(black_box(n)))
        });
    }
}

fn contains_bench_vary_n(c: &mut Criterion) {
    let mut group = c.benchmark_group("cuckoo::contains_varying_size");
    for n in [10_000, 100_000, 1_000_000] {
        let table = insert_n(n);
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, &_| {
            b.iter(|| contains(black_box(&table)))
        });
    }
}

criterion_group!(benches, insert_bench_vary_n, contains_bench_vary_n);
criterion_main!(benches);
