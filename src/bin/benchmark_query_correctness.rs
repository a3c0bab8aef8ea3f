use rand::{distributions::Uniform, Rng, SeedableRng};
use reputation_core::{CheckResult, ManagerConfig, ReputationManager};
use std::net::Ipv4Addr;
use std::time::SystemTime;

fn main() -> anyhow::Result<()> {
    use std::env;
    let args: Vec<String> = env::args().collect();
    let num_malicious: u32 = args.get(1).map(String::as_str).unwrap_or("10000").parse()?;
    let num_queries: u64 = args.get(2).map(String::as_str).unwrap_or("100000").parse()?;

    let manager: ReputationManager<Vec<u8>> = ReputationManager::new(ManagerConfig {
        expected_items: num_malicious as u64,
        fpr_limit: 0.05,
        ..Default::default()
    })?;
    for i in 0..num_malicious {
        let ip = Ipv4Addr::from(i.to_be_bytes());
        manager.report_malicious(&ip.to_string(), 0, None)?;
    }

    let start_querying = SystemTime::now();
    let mut false_positives = 0u64;
    let mut false_negatives = 0u64;
    // sample from the disjoint upper half of the address space, which is
    // known-absent by construction.
    let value_distribution = Uniform::new(num_malicious as u64, u32::MAX as u64);
    let mut rng = rand_xoshiro::Xoshiro256PlusPlus::seed_from_u64(1337);

    for _ in 0..num_queries {
        let value = rng.sample(value_distribution) as u32;
        let ip = Ipv4Addr::from(value.to_be_bytes());
        match manager.fast_check(&ip.to_string(), 0) {
            CheckResult::Clean => {}
            CheckResult::BloomFalsePositive => false_positives += 1,
            CheckResult::Malicious => false_negatives += 1, // a known-absent address classified malicious would itself be a bug
        }
    }
    let query_duration = start_querying.elapsed()?;
    let fp_rate = false_positives as f64 / num_queries as f64;

    eprintln!(
        "tp;correctness: {} false positives, {} false negatives, fp-rate {:.5}",
        false_positives, false_negatives, fp_rate,
    );
    eprintln!(
        "tp;bench query: queried {} elems in {:?} ({:?} ops/s)",
        num_queries,
        query_duration,
        num_queries as u128 * 1000 / query_duration.as_millis().max(1)
    );
    Ok(())
}
