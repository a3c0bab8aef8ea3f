//! The Reputation Manager: composes the Bloom pre-filter and the Cuckoo
//! exact-membership table, owns the shared salt, and drives the
//! adaptive rebuild policy that keeps both structures within their
//! configured bounds as the malicious set grows.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::bloom::{BloomFilter, BloomParams};
use crate::cuckoo::exact::{ExactKeyTable, ExactKeyTableConfig};
use crate::cuckoo::fingerprint::{FingerprintTable, FingerprintTableConfig};
use crate::cuckoo::ReputationEntry;
use crate::error::Error;
use crate::metrics::{Metrics, MetricsSnapshot};
use crate::salt::{generate_salt, Salt};
use crate::types::{ip_to_key, IPKey, Timestamp};

/// Which Cuckoo storage mode the Manager should construct: full-key or
/// fingerprint-only.
#[derive(Debug, Clone, Copy)]
pub enum StorageMode {
    /// Slots hold full `IPKey`s. Required if Bloom rebuilds must draw
    /// on live keys, which is the common case.
    ExactKey,
    /// Slots hold only a fingerprint, saving memory. `retain_keys` must
    /// be `true` for this table to support a Bloom rebuild or a grow
    /// rehash at all — without it, both are refused at the point they'd
    /// be needed.
    Fingerprint { retain_keys: bool },
}

impl Default for StorageMode {
    fn default() -> Self {
        StorageMode::ExactKey
    }
}

/// Construction-time configuration for a [`ReputationManager`].
#[derive(Debug, Clone, Copy)]
pub struct ManagerConfig {
    pub expected_items: u64,
    pub fpr_limit: f64,
    pub cuckoo_load_limit: f64,
    pub growth_factor: u32,
    pub fingerprint_bits: u8,
    pub maintenance_interval: u64,
    pub salt: Option<Salt>,
    pub mode: StorageMode,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        ManagerConfig {
            expected_items: 10_000,
            fpr_limit: 0.05,
            cuckoo_load_limit: 0.95,
            growth_factor: 2,
            fingerprint_bits: 16,
            maintenance_interval: 1_000,
            salt: None,
            mode: StorageMode::ExactKey,
        }
    }
}

enum Table<M> {
    Exact(ExactKeyTable<M>),
    Fingerprint(FingerprintTable<M>),
}

impl<M: Clone> Table<M> {
    fn insert(&self, key: IPKey, entry: ReputationEntry<M>) -> Result<(bool, u32), Error> {
        match self {
            Table::Exact(t) => t.insert(key, entry),
            Table::Fingerprint(t) => t.insert(key, entry),
        }
    }

    fn lookup(&self, key: IPKey) -> Option<ReputationEntry<M>> {
        match self {
            Table::Exact(t) => t.lookup(key),
            Table::Fingerprint(t) => t.lookup(key),
        }
    }

    fn remove(&self, key: IPKey) -> bool {
        match self {
            Table::Exact(t) => t.remove(key),
            Table::Fingerprint(t) => t.remove(key),
        }
    }

    fn load_factor(&self) -> f64 {
        match self {
            Table::Exact(t) => t.load_factor(),
            Table::Fingerprint(t) => t.load_factor(),
        }
    }

    fn estimate_fpr(&self) -> f64 {
        match self {
            Table::Exact(t) => t.estimate_fpr(),
            Table::Fingerprint(t) => t.estimate_fpr(),
        }
    }

    fn size(&self) -> u64 {
        match self {
            Table::Exact(t) => t.size(),
            Table::Fingerprint(t) => t.size(),
        }
    }

    fn num_buckets(&self) -> u64 {
        match self {
            Table::Exact(t) => t.num_buckets(),
            Table::Fingerprint(t) => t.num_buckets(),
        }
    }

    fn rehash_count(&self) -> u64 {
        match self {
            Table::Exact(t) => t.rehash_count(),
            Table::Fingerprint(t) => t.rehash_count(),
        }
    }

    fn rehash(&self, requested_buckets: u64) -> Result<(), Error> {
        match self {
            Table::Exact(t) => t.rehash(requested_buckets),
            Table::Fingerprint(t) => t.rehash(requested_buckets),
        }
    }

    /// Live keys available for a Bloom rebuild, or `None` if this table
    /// can't produce them (fingerprint mode without key retention).
    fn keys_for_rebuild(&self) -> Option<Vec<IPKey>> {
        match self {
            Table::Exact(t) => Some(t.keys()),
            Table::Fingerprint(t) => t.retained_keys(),
        }
    }
}

/// The outcome of `fast_check`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum CheckResult {
    Clean,
    Malicious,
    BloomFalsePositive,
}

/// A read-only snapshot of everything an operator might want to know
/// about the Manager's current state.
#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize)]
pub struct StatsSnapshot {
    pub metrics: MetricsSnapshot,
    pub bloom_m: u64,
    pub bloom_k: u32,
    pub bloom_estimated_fpr: f64,
    pub cuckoo_num_buckets: u64,
    pub cuckoo_load_factor: f64,
    pub cuckoo_rehash_count: u64,
    pub cuckoo_size: u64,
    pub cuckoo_estimated_fpr: f64,
}

impl StatsSnapshot {
    /// Encodes this snapshot for shipping to an external metrics
    /// collector or a status endpoint that isn't JSON-based.
    pub fn to_bincode(&self) -> Result<Vec<u8>, Error> {
        bincode::serialize(self).map_err(|e| Error::Serialization(e.to_string()))
    }

    pub fn from_bincode(bytes: &[u8]) -> Result<Self, Error> {
        bincode::deserialize(bytes).map_err(|e| Error::Serialization(e.to_string()))
    }
}

const REBUILD_LOG_CAPACITY: usize = 256;

/// Composes a Bloom pre-filter and a Cuckoo exact-membership table
/// behind one public API. `M` is the caller's opaque per-entry metadata
/// type.
pub struct ReputationManager<M: Clone = Vec<u8>> {
    bloom: RwLock<Arc<BloomFilter>>,
    cuckoo: Table<M>,
    salt: Salt,
    config: ManagerConfig,
    metrics: Metrics,
    op_count: AtomicU64,
    rebuild_log: Mutex<Vec<String>>,
}

impl<M: Clone> ReputationManager<M> {
    /// Builds Bloom and Cuckoo from a capacity estimate and FPR target,
    /// sharing one salt between them so a same-salt rebuild preserves
    /// key identity.
    pub fn new(config: ManagerConfig) -> Result<Self, Error> {
        if config.expected_items == 0 {
            return Err(Error::InvalidConfig(
                "expected_items must be positive".into(),
            ));
        }
        if !(config.fpr_limit > 0.0 && config.fpr_limit < 1.0) {
            return Err(Error::InvalidConfig("fpr_limit must be in (0, 1)".into()));
        }
        if config.growth_factor < 2 {
            return Err(Error::InvalidConfig("growth_factor must be >= 2".into()));
        }

        let salt = config.salt.unwrap_or_else(generate_salt);

        let bloom = BloomFilter::for_capacity(config.expected_items, config.fpr_limit, salt)?;

        let cuckoo = match config.mode {
            StorageMode::ExactKey => Table::Exact(ExactKeyTable::new(
                ExactKeyTableConfig {
                    initial_buckets: config.expected_items,
                    load_limit: config.cuckoo_load_limit,
                    growth_factor: config.growth_factor,
                    ..Default::default()
                },
                salt,
            )?),
            StorageMode::Fingerprint { retain_keys } => Table::Fingerprint(FingerprintTable::new(
                FingerprintTableConfig {
                    initial_buckets: config.expected_items,
                    load_limit: config.cuckoo_load_limit,
                    growth_factor: config.growth_factor,
                    fingerprint_bits: config.fingerprint_bits,
                    retain_keys,
                    ..Default::default()
                },
                salt,
            )?),
        };

        info!(
            m_bits = bloom.m(),
            k_hash = bloom.k(),
            expected_items = config.expected_items,
            "reputation manager constructed"
        );

        Ok(ReputationManager {
            bloom: RwLock::new(Arc::new(bloom)),
            cuckoo,
            salt,
            config,
            metrics: Metrics::new(),
            op_count: AtomicU64::new(0),
            rebuild_log: Mutex::new(Vec::new()),
        })
    }

    pub fn salt(&self) -> Salt {
        self.salt
    }

    /// Records a new malicious IP, or refreshes `last_seen` if already
    /// tracked. Cuckoo first, Bloom second: if the Cuckoo insert fails,
    /// no Bloom bit is ever set for this key.
    pub fn report_malicious(
        &self,
        ip: &str,
        now: Timestamp,
        metadata: Option<M>,
    ) -> Result<(), Error> {
        let key = ip_to_key(ip)?;

        let entry = match self.cuckoo.lookup(key) {
            Some(mut existing) => {
                existing.last_seen = now;
                if metadata.is_some() {
                    existing.metadata = metadata;
                }
                existing
            }
            None => ReputationEntry::new(key, now, metadata),
        };

        let (_placed, kicks) = self.cuckoo.insert(key, entry)?;
        self.metrics.record_insertion();
        self.metrics.record_evictions(kicks as u64);

        let bloom = self.bloom.read().expect("bloom pointer lock poisoned").clone();
        bloom.insert(key);

        let ops = self.op_count.fetch_add(1, Ordering::Relaxed) + 1;
        if ops % self.config.maintenance_interval == 0 {
            self.maybe_rebuild(now)?;
        }
        Ok(())
    }

    /// Bloom probe, then Cuckoo disambiguation on a hit. Cannot fail.
    pub fn fast_check(&self, ip: &str, now: Timestamp) -> CheckResult {
        let _ = now;
        let started = Instant::now();

        let result = match ip_to_key(ip) {
            Err(_) => CheckResult::Clean,
            Ok(key) => {
                let bloom = self.bloom.read().expect("bloom pointer lock poisoned").clone();
                let bloom_hit = bloom.might_contain(key);
                self.metrics.record_bloom_check(bloom_hit);

                if !bloom_hit {
                    CheckResult::Clean
                } else if self.cuckoo.lookup(key).is_some() {
                    self.metrics.record_cuckoo_hit();
                    CheckResult::Malicious
                } else {
                    self.metrics.record_cuckoo_miss();
                    self.metrics.record_bloom_false_positive();
                    CheckResult::BloomFalsePositive
                }
            }
        };

        let micros = started.elapsed().as_micros().min(u64::MAX as u128) as u64;
        self.metrics.record_lookup_latency_us(micros);
        result
    }

    /// Removes from Cuckoo only; Bloom is left untouched, so FPR drifts
    /// upward slightly until the next rebuild reclaims it.
    pub fn remove_malicious(&self, ip: &str) -> bool {
        let key = match ip_to_key(ip) {
            Ok(k) => k,
            Err(_) => return false,
        };
        let removed = self.cuckoo.remove(key);
        if removed {
            self.metrics.record_removal();
        }
        removed
    }

    /// Idempotent entry point for the adaptive rebuild policy. Safe to
    /// call on every tick: each check is cheap and only acts when its
    /// threshold is actually exceeded.
    pub fn maintenance(&self, now: Timestamp) -> Result<(), Error> {
        self.maybe_rebuild(now)
    }

    fn maybe_rebuild(&self, now: Timestamp) -> Result<(), Error> {
        let _ = now;

        if self.cuckoo.load_factor() >= self.config.cuckoo_load_limit {
            let target = self
                .cuckoo
                .num_buckets()
                .saturating_mul(self.config.growth_factor as u64);
            self.cuckoo.rehash(target)?;
            self.metrics.record_cuckoo_rehash();
            self.log_rebuild_event(format!(
                "cuckoo rehash -> {} buckets (load {:.3})",
                self.cuckoo.num_buckets(),
                self.cuckoo.load_factor()
            ));
        }

        let bloom = self.bloom.read().expect("bloom pointer lock poisoned").clone();
        if bloom.estimate_fpr() <= self.config.fpr_limit {
            return Ok(());
        }

        let n_active = self.cuckoo.size();
        if n_active == 0 {
            return Ok(());
        }

        let Some(keys) = self.cuckoo.keys_for_rebuild() else {
            warn!("bloom rebuild skipped: fingerprint-mode table has no retained keys");
            return Ok(());
        };

        let ln2_sq = std::f64::consts::LN_2 * std::f64::consts::LN_2;
        let m_req = (-(n_active as f64) * self.config.fpr_limit.ln() / ln2_sq).ceil() as u64;
        let m_new = (bloom.m() * 2).max(m_req);
        let k_new = (((m_new as f64 / n_active as f64) * std::f64::consts::LN_2).round() as u32)
            .max(1);

        let new_bloom = BloomFilter::new(m_new, k_new, self.salt)?;
        for key in &keys {
            new_bloom.insert(*key);
        }

        {
            let mut guard = self.bloom.write().expect("bloom pointer lock poisoned");
            *guard = Arc::new(new_bloom);
        }
        self.metrics.record_bloom_rebuild();
        self.log_rebuild_event(format!(
            "bloom rebuild -> m={m_new} k={k_new} from {} live keys",
            keys.len()
        ));
        Ok(())
    }

    fn log_rebuild_event(&self, message: String) {
        debug!("{message}");
        let mut log = self.rebuild_log.lock().expect("rebuild log lock poisoned");
        log.push(message);
        if log.len() > REBUILD_LOG_CAPACITY {
            let overflow = log.len() - REBUILD_LOG_CAPACITY;
            log.drain(0..overflow);
        }
    }

    /// The most recent rebuild/rehash events, oldest first, bounded at
    /// [`REBUILD_LOG_CAPACITY`] entries.
    pub fn rebuild_log(&self) -> Vec<String> {
        self.rebuild_log.lock().expect("rebuild log lock poisoned").clone()
    }

    pub fn stats(&self) -> StatsSnapshot {
        let bloom = self.bloom.read().expect("bloom pointer lock poisoned").clone();
        StatsSnapshot {
            metrics: self.metrics.snapshot(),
            bloom_m: bloom.m(),
            bloom_k: bloom.k(),
            bloom_estimated_fpr: bloom.estimate_fpr(),
            cuckoo_num_buckets: self.cuckoo.num_buckets(),
            cuckoo_load_factor: self.cuckoo.load_factor(),
            cuckoo_rehash_count: self.cuckoo.rehash_count(),
            cuckoo_size: self.cuckoo.size(),
            cuckoo_estimated_fpr: self.cuckoo.estimate_fpr(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager(expected_items: u64, fpr_limit: f64) -> ReputationManager<Vec<u8>> {
        ReputationManager::new(ManagerConfig {
            expected_items,
            fpr_limit,
            salt: Some(1),
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn reported_ip_is_never_clean() {
        let m = manager(100, 0.05);
        m.report_malicious("10.0.0.1", 0, None).unwrap();
        assert_eq!(m.fast_check("10.0.0.1", 0), CheckResult::Malicious);
    }

    #[test]
    fn unreported_ip_checks_clean_on_empty_structure() {
        let m = manager(100, 0.05);
        assert_eq!(m.fast_check("8.8.8.8", 0), CheckResult::Clean);
    }

    #[test]
    fn repeated_report_preserves_first_seen_and_advances_last_seen() {
        let m = manager(100, 0.05);
        m.report_malicious("10.0.0.1", 10, None).unwrap();
        m.report_malicious("10.0.0.1", 20, None).unwrap();
        assert_eq!(m.stats().cuckoo_size, 1);
    }

    #[test]
    fn remove_then_check_never_returns_malicious() {
        let m = manager(100, 0.05);
        m.report_malicious("10.0.0.1", 0, None).unwrap();
        assert!(m.remove_malicious("10.0.0.1"));
        assert_ne!(m.fast_check("10.0.0.1", 0), CheckResult::Malicious);
    }

    #[test]
    fn adaptive_growth_keeps_full_recall_and_bounded_fpr() {
        let m = manager(100, 0.05);
        for i in 0..30_000u32 {
            let ip = std::net::Ipv4Addr::from(i.to_be_bytes());
            m.report_malicious(&ip.to_string(), 0, None).unwrap();
        }
        m.maintenance(0).unwrap();

        for i in 0..30_000u32 {
            let ip = std::net::Ipv4Addr::from(i.to_be_bytes());
            assert_eq!(m.fast_check(&ip.to_string(), 0), CheckResult::Malicious);
        }
        let stats = m.stats();
        assert!(stats.cuckoo_rehash_count >= 1);
        assert!(stats.metrics.bloom_rebuilds >= 1);
        assert!(stats.bloom_estimated_fpr <= 0.05 * 1.5);
    }

    #[test]
    fn stats_snapshot_roundtrips_through_bincode() {
        let m = manager(100, 0.05);
        m.report_malicious("10.0.0.1", 0, None).unwrap();
        let stats = m.stats();
        let bytes = stats.to_bincode().unwrap();
        let back = StatsSnapshot::from_bincode(&bytes).unwrap();
        assert_eq!(back.cuckoo_size, stats.cuckoo_size);
        assert_eq!(back.bloom_m, stats.bloom_m);
    }

    #[test]
    fn eviction_metric_accumulates_cuckoo_kicks() {
        let m = manager(8, 0.05);
        for i in 0u32..40 {
            let ip = std::net::Ipv4Addr::from(i.to_be_bytes());
            m.report_malicious(&ip.to_string(), 0, None).unwrap();
        }
        assert!(m.stats().metrics.evictions > 0);
    }

    #[test]
    fn malformed_address_is_rejected_without_panicking() {
        let m = manager(100, 0.05);
        assert!(m.report_malicious("not-an-ip", 0, None).is_err());
        assert_eq!(m.fast_check("not-an-ip", 0), CheckResult::Clean);
    }

    /// End-to-end scenario 1: baseline FPR against known-absent addresses.
    #[test]
    fn baseline_fpr_stays_under_target() {
        let m = manager(100, 0.05);
        for i in 1u32..=100 {
            let ip = std::net::Ipv4Addr::new(10, 0, 0, i as u8);
            m.report_malicious(&ip.to_string(), 0, None).unwrap();
        }

        let mut false_positives = 0u32;
        let samples = 10_000u32;
        for i in 0..samples {
            let ip = std::net::Ipv4Addr::new(
                192,
                168,
                (i / 256) as u8,
                (i % 256) as u8,
            );
            if m.fast_check(&ip.to_string(), 0) != CheckResult::Clean {
                false_positives += 1;
            }
        }
        let observed = false_positives as f64 / samples as f64;
        assert!(observed <= 0.05 * 1.5, "observed fpr too high: {observed}");
    }

    /// End-to-end scenario 3: deletion never regresses recall on the
    /// survivors, and never reports MALICIOUS for the removed half.
    #[test]
    fn delete_at_scale_does_not_regress_recall() {
        let m = manager(1_000, 0.05);
        for i in 0u32..1_000 {
            let ip = std::net::Ipv4Addr::from(i.to_be_bytes());
            m.report_malicious(&ip.to_string(), 0, None).unwrap();
        }
        for i in 0u32..500 {
            let ip = std::net::Ipv4Addr::from(i.to_be_bytes());
            assert!(m.remove_malicious(&ip.to_string()));
        }
        for i in 0u32..500 {
            let ip = std::net::Ipv4Addr::from(i.to_be_bytes());
            assert_ne!(m.fast_check(&ip.to_string(), 0), CheckResult::Malicious);
        }
        for i in 500u32..1_000 {
            let ip = std::net::Ipv4Addr::from(i.to_be_bytes());
            assert_eq!(m.fast_check(&ip.to_string(), 0), CheckResult::Malicious);
        }
    }

    /// End-to-end scenario 4 (scaled down): a mixed stream of attack and
    /// fresh-random queries keeps the false-positive share on the
    /// fresh-random slice bounded, with full recall on the attack slice.
    #[test]
    fn mixed_workload_bounds_fpr_and_keeps_full_recall() {
        let m = manager(5_000, 0.05);
        for i in 0u32..5_000 {
            let ip = std::net::Ipv4Addr::from(i.to_be_bytes());
            m.report_malicious(&ip.to_string(), 0, None).unwrap();
        }
        m.maintenance(0).unwrap();

        let mut fresh_total = 0u32;
        let mut fresh_false_positive = 0u32;
        for i in 0u32..5_000 {
            let attack_ip = std::net::Ipv4Addr::from(i.to_be_bytes());
            assert_eq!(
                m.fast_check(&attack_ip.to_string(), 0),
                CheckResult::Malicious
            );

            let fresh = std::net::Ipv4Addr::new(172, 16, (i / 256) as u8, (i % 256) as u8);
            if m.fast_check(&fresh.to_string(), 0) != CheckResult::Clean {
                fresh_false_positive += 1;
            }
            fresh_total += 1;
        }
        let observed = fresh_false_positive as f64 / fresh_total as f64;
        assert!(observed <= 0.05 * 1.5, "fresh-traffic fpr too high: {observed}");
    }

    /// End-to-end scenario 5: after `report_malicious(X)` returns on one
    /// thread, a later `fast_check(X)` on another thread must never see
    /// CLEAN, because the acquire/release edge on the Bloom lock makes
    /// the insert visible before the write-lock guard is dropped.
    #[test]
    fn cross_thread_report_happens_before_later_fast_check() {
        use std::sync::Arc;

        let m = Arc::new(manager(1_000, 0.05));
        let mut handles = Vec::new();
        for t in 0..8u32 {
            let m = Arc::clone(&m);
            handles.push(std::thread::spawn(move || {
                let ip = std::net::Ipv4Addr::from(t.to_be_bytes());
                m.report_malicious(&ip.to_string(), 0, None).unwrap();
                let ip_str = ip.to_string();
                assert_ne!(m.fast_check(&ip_str, 0), CheckResult::Clean);
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
    }
}
