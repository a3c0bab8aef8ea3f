use anyhow::Result;
use reputation_core::{ManagerConfig, ReputationManager};

/// Small end-to-end demo: report a handful of malicious IPs, then query
/// a mix of malicious and clean addresses through `fast_check`.
fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let manager: ReputationManager<String> = ReputationManager::new(ManagerConfig {
        expected_items: 100,
        fpr_limit: 0.01,
        ..Default::default()
    })?;

    let malicious = [
        "45.33.32.156",
        "185.220.101.7",
        "198.51.100.23",
        "203.0.113.77",
    ];
    for ip in malicious {
        manager.report_malicious(ip, 0, Some("synthetic-demo".to_string()))?;
    }

    let queries = [
        "45.33.32.156",   // reported, expect Malicious
        "8.8.8.8",        // never reported, expect Clean
        "203.0.113.77",   // reported, expect Malicious
        "192.168.1.1",    // never reported, expect Clean
    ];
    for ip in queries {
        let result = manager.fast_check(ip, 0);
        println!("{ip:>15} -> {result:?}");
    }

    let stats = manager.stats();
    println!(
        "\nbloom: m={} k={} estimated_fpr={:.5}\ncuckoo: buckets={} load={:.3} size={}",
        stats.bloom_m,
        stats.bloom_k,
        stats.bloom_estimated_fpr,
        stats.cuckoo_num_buckets,
        stats.cuckoo_load_factor,
        stats.cuckoo_size,
    );

    Ok(())
}
