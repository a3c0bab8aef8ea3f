//! Operational counters for the Reputation Manager: how many checks hit
//! the Bloom filter, how many of those were false positives, how many
//! rebuilds/rehashes have run, and accumulated lookup latency.
//!
//! Grounded in the Python prototype's `Metrics` dataclass
//! (`core/metrics/metrics.py`), extended with the rebuild/rehash
//! counters the manager's adaptive rescale policy needs.

use std::sync::atomic::{AtomicU64, Ordering};

/// All counters use `Relaxed` ordering: they're independent tallies with
/// no cross-field invariant a reader depends on atomically, so there's
/// nothing for a stronger ordering to buy.
#[derive(Debug, Default)]
pub struct Metrics {
    bloom_checks: AtomicU64,
    bloom_hits: AtomicU64,
    bloom_misses: AtomicU64,
    bloom_false_positives: AtomicU64,
    cuckoo_hits: AtomicU64,
    cuckoo_misses: AtomicU64,
    insertions: AtomicU64,
    evictions: AtomicU64,
    removals: AtomicU64,
    bloom_rebuilds: AtomicU64,
    cuckoo_rehashes: AtomicU64,
    lookup_latency_total_us: AtomicU64,
    lookup_count: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_bloom_check(&self, hit: bool) {
        self.bloom_checks.fetch_add(1, Ordering::Relaxed);
        if hit {
            self.bloom_hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.bloom_misses.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_bloom_false_positive(&self) {
        self.bloom_false_positives.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_cuckoo_hit(&self) {
        self.cuckoo_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_cuckoo_miss(&self) {
        self.cuckoo_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_insertion(&self) {
        self.insertions.fetch_add(1, Ordering::Relaxed);
    }

    /// Accumulates `n` cuckoo kicks (slot displacements during an
    /// eviction chain), not insertions placed directly into an empty
    /// slot.
    pub(crate) fn record_evictions(&self, n: u64) {
        if n > 0 {
            self.evictions.fetch_add(n, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_removal(&self) {
        self.removals.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_bloom_rebuild(&self) {
        self.bloom_rebuilds.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_cuckoo_rehash(&self) {
        self.cuckoo_rehashes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_lookup_latency_us(&self, micros: u64) {
        self.lookup_latency_total_us
            .fetch_add(micros, Ordering::Relaxed);
        self.lookup_count.fetch_add(1, Ordering::Relaxed);
    }

    /// A point-in-time, non-atomic-across-fields copy of every counter.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            bloom_checks: self.bloom_checks.load(Ordering::Relaxed),
            bloom_hits: self.bloom_hits.load(Ordering::Relaxed),
            bloom_misses: self.bloom_misses.load(Ordering::Relaxed),
            bloom_false_positives: self.bloom_false_positives.load(Ordering::Relaxed),
            cuckoo_hits: self.cuckoo_hits.load(Ordering::Relaxed),
            cuckoo_misses: self.cuckoo_misses.load(Ordering::Relaxed),
            insertions: self.insertions.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            removals: self.removals.load(Ordering::Relaxed),
            bloom_rebuilds: self.bloom_rebuilds.load(Ordering::Relaxed),
            cuckoo_rehashes: self.cuckoo_rehashes.load(Ordering::Relaxed),
            lookup_latency_total_us: self.lookup_latency_total_us.load(Ordering::Relaxed),
            lookup_count: self.lookup_count.load(Ordering::Relaxed),
        }
    }
}

/// Immutable snapshot returned by [`Metrics::snapshot`], with the
/// derived rates the raw counters don't give for free.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct MetricsSnapshot {
    pub bloom_checks: u64,
    pub bloom_hits: u64,
    pub bloom_misses: u64,
    pub bloom_false_positives: u64,
    pub cuckoo_hits: u64,
    pub cuckoo_misses: u64,
    pub insertions: u64,
    pub evictions: u64,
    pub removals: u64,
    pub bloom_rebuilds: u64,
    pub cuckoo_rehashes: u64,
    pub lookup_latency_total_us: u64,
    pub lookup_count: u64,
}

impl MetricsSnapshot {
    /// `bloom_false_positive / total_queries`: the observed false
    /// positive rate across every `fast_check` call, not just the ones
    /// that hit the Bloom filter. `total_queries` is `bloom_checks`,
    /// since every `fast_check` probes Bloom exactly once. `None` with
    /// zero queries.
    pub fn observed_fpr(&self) -> Option<f64> {
        if self.bloom_checks == 0 {
            return None;
        }
        Some(self.bloom_false_positives as f64 / self.bloom_checks as f64)
    }

    /// `bloom_positive / total_queries`: the fraction of queries the
    /// Bloom filter answered with a positive (hit), whether or not the
    /// hit was later confirmed malicious.
    pub fn bloom_positive_rate(&self) -> Option<f64> {
        if self.bloom_checks == 0 {
            return None;
        }
        Some(self.bloom_hits as f64 / self.bloom_checks as f64)
    }

    pub fn average_lookup_latency_us(&self) -> Option<f64> {
        if self.lookup_count == 0 {
            return None;
        }
        Some(self.lookup_latency_total_us as f64 / self.lookup_count as f64)
    }
}
