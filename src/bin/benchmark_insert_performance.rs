use reputation_core::{ManagerConfig, ReputationManager};
use std::net::Ipv4Addr;
use std::time::SystemTime;

fn main() -> anyhow::Result<()> {
    use std::env;
    let args: Vec<String> = env::args().collect();
    let num_ips: u32 = args.get(1).map(String::as_str).unwrap_or("100000").parse()?;
    let expected_items: u64 = args.get(2).map(String::as_str).unwrap_or("100000").parse()?;

    let manager: ReputationManager<Vec<u8>> = ReputationManager::new(ManagerConfig {
        expected_items,
        ..Default::default()
    })?;

    let start_indexing = SystemTime::now();
    for i in 0..num_ips {
        let ip = Ipv4Addr::from(i.to_be_bytes());
        manager.report_malicious(&ip.to_string(), i as i64, None)?;
    }
    let insert_duration = start_indexing.elapsed()?;

    eprintln!(
        "tp;bench01: inserted {} ips in {:?} ({:?} ops/s)",
        num_ips,
        insert_duration,
        num_ips as u128 * 1000 / insert_duration.as_millis().max(1)
    );
    let stats = manager.stats();
    eprintln!(
        "tp;bench01: cuckoo_rehash_count={} bloom_rebuilds={} bloom_m={} bloom_estimated_fpr={:.5}",
        stats.cuckoo_rehash_count, stats.metrics.bloom_rebuilds, stats.bloom_m, stats.bloom_estimated_fpr,
    );
    Ok(())
}
