//! Exact-key cuckoo hashing: slots store the full `IPKey` alongside the
//! value, so `lookup`/`remove` compare real keys (no secondary FPR) and
//! a Bloom rebuild can re-insert true keys directly from the table.

use rand::Rng;
use std::sync::RwLock;

use super::{next_power_of_two, ReputationEntry, SLOTS_PER_BUCKET};
use crate::error::Error;
use crate::hash::{alt_bucket, double_hash, fingerprint};
use crate::salt::Salt;
use crate::types::IPKey;

const FINGERPRINT_BITS: u8 = 16;

#[derive(Clone)]
enum Slot<M> {
    Empty,
    Occupied(IPKey, ReputationEntry<M>),
}

struct Inner<M> {
    buckets: Vec<[Slot<M>; SLOTS_PER_BUCKET]>,
    num_buckets: u64,
    size: u64,
    rehash_count: u64,
}

impl<M> Inner<M> {
    fn new(num_buckets: u64) -> Self {
        Inner {
            buckets: (0..num_buckets)
                .map(|_| {
                    [
                        Slot::Empty,
                        Slot::Empty,
                        Slot::Empty,
                        Slot::Empty,
                    ]
                })
                .collect(),
            num_buckets,
            size: 0,
            rehash_count: 0,
        }
    }

    fn load_factor(&self) -> f64 {
        self.size as f64 / (self.num_buckets as f64 * SLOTS_PER_BUCKET as f64)
    }
}

/// Construction-time knobs for an [`ExactKeyTable`].
#[derive(Debug, Clone, Copy)]
pub struct ExactKeyTableConfig {
    pub initial_buckets: u64,
    pub load_limit: f64,
    pub growth_factor: u32,
    pub max_kicks: u32,
}

impl Default for ExactKeyTableConfig {
    fn default() -> Self {
        ExactKeyTableConfig {
            initial_buckets: 512,
            load_limit: 0.95,
            growth_factor: 2,
            max_kicks: 500,
        }
    }
}

/// A bucketed cuckoo hash table (Fan et al. 2014) keyed by the full
/// `IPKey`, shielded by a single reader-writer lock: `lookup` takes the
/// read half, `insert`/`remove`/rehash take the write half.
pub struct ExactKeyTable<M> {
    inner: RwLock<Inner<M>>,
    salt: Salt,
    config: ExactKeyTableConfig,
}

impl<M: Clone> ExactKeyTable<M> {
    pub fn new(config: ExactKeyTableConfig, salt: Salt) -> Result<Self, Error> {
        if config.growth_factor < 2 {
            return Err(Error::InvalidConfig("growth_factor must be >= 2".into()));
        }
        if !(config.load_limit > 0.0 && config.load_limit < 1.0) {
            return Err(Error::InvalidConfig(
                "cuckoo_load_limit must be in (0, 1)".into(),
            ));
        }
        let num_buckets = next_power_of_two(config.initial_buckets);
        Ok(ExactKeyTable {
            inner: RwLock::new(Inner::new(num_buckets)),
            salt,
            config,
        })
    }

    fn candidate_buckets(&self, key: IPKey, num_buckets: u64) -> (u64, u64) {
        let fp = fingerprint(self.salt, key, FINGERPRINT_BITS);
        let i1 = double_hash(self.salt, key).0 % num_buckets;
        let i2 = alt_bucket(i1, fp, num_buckets);
        (i1, i2)
    }

    /// Places `(key, entry)` in one of its two candidate buckets. If the
    /// key is already present, overwrites the value and reports success
    /// without increasing `size`. May trigger an internal rehash; the
    /// call appears synchronous and atomic to the caller. The second
    /// element of the returned tuple is the number of cuckoo kicks
    /// (slot displacements) this call performed, for eviction metrics.
    pub fn insert(&self, key: IPKey, entry: ReputationEntry<M>) -> Result<(bool, u32), Error> {
        let mut inner = self.inner.write().expect("cuckoo lock poisoned");

        if inner.load_factor() >= self.config.load_limit {
            let target = inner.num_buckets.saturating_mul(self.config.growth_factor as u64);
            self.rehash_locked(&mut inner, target)?;
        }

        let (placed, kicks) = self.try_place(&mut inner, key, entry.clone());
        if placed {
            return Ok((true, kicks));
        }

        // Kick budget exhausted: grow and retry exactly once more,
        // bounded and non-recursive.
        let target = inner.num_buckets.saturating_mul(self.config.growth_factor as u64);
        self.rehash_locked(&mut inner, target)?;

        let (placed, kicks2) = self.try_place(&mut inner, key, entry);
        if placed {
            Ok((true, kicks + kicks2))
        } else {
            Err(Error::InsertFailure {
                max_kicks: self.config.max_kicks,
            })
        }
    }

    fn try_place(&self, inner: &mut Inner<M>, key: IPKey, entry: ReputationEntry<M>) -> (bool, u32) {
        let num_buckets = inner.num_buckets;
        let (i1, i2) = self.candidate_buckets(key, num_buckets);

        for &b in &[i1, i2] {
            for slot in inner.buckets[b as usize].iter_mut() {
                if let Slot::Occupied(k, existing) = slot {
                    if *k == key {
                        *existing = entry;
                        return (true, 0);
                    }
                }
            }
        }

        for &b in &[i1, i2] {
            for slot in inner.buckets[b as usize].iter_mut() {
                if matches!(slot, Slot::Empty) {
                    *slot = Slot::Occupied(key, entry);
                    inner.size += 1;
                    return (true, 0);
                }
            }
        }

        let mut rng = rand::thread_rng();
        let mut bucket = if rng.gen_bool(0.5) { i1 } else { i2 };
        let mut homeless_key = key;
        let mut homeless_entry = entry;
        let mut kicks = 0u32;

        for _ in 0..self.config.max_kicks {
            let slot_idx = rng.gen_range(0..SLOTS_PER_BUCKET);
            let slot = &mut inner.buckets[bucket as usize][slot_idx];
            let placed = Slot::Occupied(homeless_key, homeless_entry);
            match std::mem::replace(slot, placed) {
                Slot::Empty => {
                    inner.size += 1;
                    return (true, kicks);
                }
                Slot::Occupied(dk, de) => {
                    kicks += 1;
                    let dfp = fingerprint(self.salt, dk, FINGERPRINT_BITS);
                    bucket = alt_bucket(bucket, dfp, num_buckets);
                    homeless_key = dk;
                    homeless_entry = de;
                }
            }
        }
        (false, kicks)
    }

    /// Checks both candidate buckets; returns a clone of the stored
    /// value if found.
    pub fn lookup(&self, key: IPKey) -> Option<ReputationEntry<M>> {
        let inner = self.inner.read().expect("cuckoo lock poisoned");
        let (i1, i2) = self.candidate_buckets(key, inner.num_buckets);
        for &b in &[i1, i2] {
            for slot in inner.buckets[b as usize].iter() {
                if let Slot::Occupied(k, e) = slot {
                    if *k == key {
                        return Some(e.clone());
                    }
                }
            }
        }
        None
    }

    pub fn contains(&self, key: IPKey) -> bool {
        self.lookup(key).is_some()
    }

    /// Clears the matching slot in either candidate bucket, if present.
    pub fn remove(&self, key: IPKey) -> bool {
        let mut inner = self.inner.write().expect("cuckoo lock poisoned");
        let (i1, i2) = self.candidate_buckets(key, inner.num_buckets);
        for &b in &[i1, i2] {
            for slot in inner.buckets[b as usize].iter_mut() {
                if let Slot::Occupied(k, _) = slot {
                    if *k == key {
                        *slot = Slot::Empty;
                        inner.size -= 1;
                        return true;
                    }
                }
            }
        }
        false
    }

    pub fn load_factor(&self) -> f64 {
        self.inner.read().expect("cuckoo lock poisoned").load_factor()
    }

    /// Exact-key storage compares full keys on lookup, so it has no
    /// secondary false positive rate of its own, unlike fingerprint
    /// mode.
    pub fn estimate_fpr(&self) -> f64 {
        0.0
    }

    pub fn size(&self) -> u64 {
        self.inner.read().expect("cuckoo lock poisoned").size
    }

    pub fn num_buckets(&self) -> u64 {
        self.inner.read().expect("cuckoo lock poisoned").num_buckets
    }

    pub fn rehash_count(&self) -> u64 {
        self.inner.read().expect("cuckoo lock poisoned").rehash_count
    }

    /// Occupied slot count per bucket, for diagnosing fingerprint/bucket
    /// distribution skew — not used on any hot path.
    pub fn bucket_occupancy(&self) -> Vec<usize> {
        let inner = self.inner.read().expect("cuckoo lock poisoned");
        inner
            .buckets
            .iter()
            .map(|b| b.iter().filter(|s| !matches!(s, Slot::Empty)).count())
            .collect()
    }

    /// All keys currently stored, for a Bloom rebuild to re-insert.
    pub fn keys(&self) -> Vec<IPKey> {
        let inner = self.inner.read().expect("cuckoo lock poisoned");
        inner
            .buckets
            .iter()
            .flat_map(|b| b.iter())
            .filter_map(|slot| match slot {
                Slot::Occupied(k, _) => Some(*k),
                Slot::Empty => None,
            })
            .collect()
    }

    /// Allocates a larger bucket array and re-inserts every live entry.
    /// Non-recursive: if an insert during rehash exhausts its kick
    /// budget, this doubles again and retries within a bounded outer
    /// loop (at most 3 doublings) rather than calling back into
    /// `insert`/`rehash`.
    pub fn rehash(&self, requested_buckets: u64) -> Result<(), Error> {
        let mut inner = self.inner.write().expect("cuckoo lock poisoned");
        self.rehash_locked(&mut inner, requested_buckets)
    }

    fn rehash_locked(&self, inner: &mut Inner<M>, requested_buckets: u64) -> Result<(), Error> {
        let entries: Vec<(IPKey, ReputationEntry<M>)> = inner
            .buckets
            .iter()
            .flat_map(|b| b.iter())
            .filter_map(|slot| match slot {
                Slot::Occupied(k, e) => Some((*k, e.clone())),
                Slot::Empty => None,
            })
            .collect();

        let mut candidate = next_power_of_two(requested_buckets).max(inner.num_buckets);
        if candidate == inner.num_buckets {
            candidate = next_power_of_two(inner.num_buckets.saturating_mul(2));
        }

        for _ in 0..3 {
            let mut attempt = Inner::new(candidate);
            let mut ok = true;
            for (k, e) in &entries {
                if !self.try_place(&mut attempt, *k, e.clone()).0 {
                    ok = false;
                    break;
                }
            }
            if ok {
                attempt.rehash_count = inner.rehash_count + 1;
                *inner = attempt;
                return Ok(());
            }
            candidate = next_power_of_two(candidate.saturating_mul(2));
        }

        Err(Error::AllocationFailure(
            "exact-key rehash exhausted its doubling budget".into(),
        ))
    }
}
