use rayon::prelude::*;
use reputation_core::{ManagerConfig, ReputationManager};
use rstats::{noop, Median, Stats};
use std::net::Ipv4Addr;
use std::time::{Duration, SystemTime};

fn run_query(manager: &ReputationManager<Vec<u8>>, ip: &str) -> Duration {
    let s = SystemTime::now();
    let _ = manager.fast_check(ip, 0);
    s.elapsed().unwrap_or_default()
}

fn main() -> anyhow::Result<()> {
    use std::env;
    let args: Vec<String> = env::args().collect();
    let num_malicious: u32 = args.get(1).map(String::as_str).unwrap_or("50000").parse()?;
    let num_queries: u64 = args.get(2).map(String::as_str).unwrap_or("200000").parse()?;

    let manager: ReputationManager<Vec<u8>> = ReputationManager::new(ManagerConfig {
        expected_items: num_malicious as u64,
        ..Default::default()
    })?;
    for i in 0..num_malicious {
        let ip = Ipv4Addr::from(i.to_be_bytes());
        manager.report_malicious(&ip.to_string(), 0, None)?;
    }

    // query a mix of known-malicious and known-absent addresses, walking
    // through a disjoint address range so the Bloom filter genuinely has
    // to disambiguate rather than short-circuit on every probe.
    let queries: Vec<String> = (0..num_queries)
        .map(|i| Ipv4Addr::from(((num_malicious as u64 + i) as u32).to_be_bytes()).to_string())
        .collect();

    let start_querying = SystemTime::now();
    let results: Vec<f64> = queries
        .par_iter()
        .map(|ip| run_query(&manager, ip).as_micros() as f64)
        .collect();
    let query_duration = start_querying.elapsed()?;

    eprintln!(
        "tp;bench query: queried {} elems in {:?} ({:?} ops/s)",
        num_queries,
        query_duration,
        num_queries as u128 * 1000 / query_duration.as_millis().max(1)
    );
    eprintln!("Median     {}", results.medstats(&mut noop)?);
    eprintln!("Arithmetic {}", results.ameanstd()?);
    eprintln!("{}", results.medinfo(&mut noop)?);
    Ok(())
}
