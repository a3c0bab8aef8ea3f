// Diagnoses bucket occupancy skew in the exact-key Cuckoo table: fills
// a table to a target load and reports the occupied-slot distribution
// across buckets. A healthy table should look roughly binomial around
// `load * slots_per_bucket`; a skewed histogram points at a weak
// alternate-bucket hash.
use reputation_core::cuckoo::exact::{ExactKeyTable, ExactKeyTableConfig};
use reputation_core::cuckoo::ReputationEntry;
use reputation_core::IPKey;

fn main() -> anyhow::Result<()> {
    use std::env;
    let args: Vec<String> = env::args().collect();
    let num_buckets: u64 = args.get(1).map(String::as_str).unwrap_or("4096").parse()?;
    let target_load: f64 = args.get(2).map(String::as_str).unwrap_or("0.8").parse()?;

    let table: ExactKeyTable<Vec<u8>> = ExactKeyTable::new(
        ExactKeyTableConfig {
            initial_buckets: num_buckets,
            load_limit: 0.99,
            ..Default::default()
        },
        42,
    )?;

    let capacity = num_buckets * 4;
    let target_size = (capacity as f64 * target_load) as u64;
    let mut i = 0u128;
    while table.size() < target_size {
        table.insert(IPKey(i), ReputationEntry::new(IPKey(i), 0, None))?;
        i += 1;
    }

    let occupancy = table.bucket_occupancy();
    let mut histogram = [0u64; 5];
    for &count in &occupancy {
        histogram[count] += 1;
    }

    eprintln!(
        "tp;bucket occupancy histogram (buckets={}, size={}, load={:.3}):",
        table.num_buckets(),
        table.size(),
        table.load_factor()
    );
    for (slots_used, num_buckets) in histogram.iter().enumerate() {
        eprintln!("  {slots_used} slots used: {num_buckets} buckets");
    }
    Ok(())
}
