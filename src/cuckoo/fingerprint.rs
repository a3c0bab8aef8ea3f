//! Fingerprint-mode cuckoo hashing: slots store a narrow fingerprint
//! instead of the full key, trading a small secondary false positive
//! rate (`lookup` FPR ≈ `2 * load / 2^fingerprint_bits`) for less memory
//! per entry. Because the original key is gone once stored, a Bloom
//! rebuild can't reconstruct true keys from this table alone — if the
//! Manager needs that, it must run this table with `retain_keys: true`
//! so an auxiliary key set is kept alongside the fingerprints.

use rand::Rng;
use std::collections::HashSet;
use std::sync::RwLock;

use super::{next_power_of_two, ReputationEntry, SLOTS_PER_BUCKET};
use crate::error::Error;
use crate::hash::{alt_bucket, double_hash, fingerprint};
use crate::salt::Salt;
use crate::types::IPKey;

#[derive(Clone)]
enum Slot<M> {
    Empty,
    Occupied(u32, ReputationEntry<M>),
}

struct Inner<M> {
    buckets: Vec<[Slot<M>; SLOTS_PER_BUCKET]>,
    num_buckets: u64,
    size: u64,
    rehash_count: u64,
    retained_keys: Option<HashSet<IPKey>>,
}

impl<M> Inner<M> {
    fn new(num_buckets: u64, retain_keys: bool) -> Self {
        Inner {
            buckets: (0..num_buckets)
                .map(|_| [Slot::Empty, Slot::Empty, Slot::Empty, Slot::Empty])
                .collect(),
            num_buckets,
            size: 0,
            rehash_count: 0,
            retained_keys: retain_keys.then(HashSet::new),
        }
    }

    fn load_factor(&self) -> f64 {
        self.size as f64 / (self.num_buckets as f64 * SLOTS_PER_BUCKET as f64)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FingerprintTableConfig {
    pub initial_buckets: u64,
    pub load_limit: f64,
    pub growth_factor: u32,
    pub max_kicks: u32,
    pub fingerprint_bits: u8,
    /// Keep an auxiliary set of true keys alongside fingerprints, so a
    /// Bloom rebuild can still re-insert real keys from this table.
    pub retain_keys: bool,
}

impl Default for FingerprintTableConfig {
    fn default() -> Self {
        FingerprintTableConfig {
            initial_buckets: 512,
            load_limit: 0.95,
            growth_factor: 2,
            max_kicks: 500,
            fingerprint_bits: 16,
            retain_keys: false,
        }
    }
}

pub struct FingerprintTable<M> {
    inner: RwLock<Inner<M>>,
    salt: Salt,
    config: FingerprintTableConfig,
}

impl<M: Clone> FingerprintTable<M> {
    pub fn new(config: FingerprintTableConfig, salt: Salt) -> Result<Self, Error> {
        if config.growth_factor < 2 {
            return Err(Error::InvalidConfig("growth_factor must be >= 2".into()));
        }
        if !(config.load_limit > 0.0 && config.load_limit < 1.0) {
            return Err(Error::InvalidConfig(
                "cuckoo_load_limit must be in (0, 1)".into(),
            ));
        }
        if !matches!(config.fingerprint_bits, 8 | 12 | 16) {
            return Err(Error::InvalidConfig(
                "fingerprint_bits must be one of 8, 12, 16".into(),
            ));
        }
        let num_buckets = next_power_of_two(config.initial_buckets);
        Ok(FingerprintTable {
            inner: RwLock::new(Inner::new(num_buckets, config.retain_keys)),
            salt,
            config,
        })
    }

    fn candidate_buckets(&self, key: IPKey, num_buckets: u64) -> (u64, u32) {
        let fp = fingerprint(self.salt, key, self.config.fingerprint_bits);
        let i1 = double_hash(self.salt, key).0 % num_buckets;
        (i1, fp)
    }

    /// The second element of the returned tuple is the number of cuckoo
    /// kicks (slot displacements) this call performed, for eviction
    /// metrics.
    pub fn insert(&self, key: IPKey, entry: ReputationEntry<M>) -> Result<(bool, u32), Error> {
        let mut inner = self.inner.write().expect("cuckoo lock poisoned");

        if inner.load_factor() >= self.config.load_limit {
            let target = inner.num_buckets.saturating_mul(self.config.growth_factor as u64);
            self.rehash_locked(&mut inner, target)?;
        }

        let (i1, fp) = self.candidate_buckets(key, inner.num_buckets);
        let i2 = alt_bucket(i1, fp, inner.num_buckets);

        let (placed, kicks) = self.try_place(&mut inner, i1, i2, fp, entry.clone());
        if placed {
            if let Some(keys) = inner.retained_keys.as_mut() {
                keys.insert(key);
            }
            return Ok((true, kicks));
        }

        let target = inner.num_buckets.saturating_mul(self.config.growth_factor as u64);
        self.rehash_locked(&mut inner, target)?;

        let (i1, fp) = self.candidate_buckets(key, inner.num_buckets);
        let i2 = alt_bucket(i1, fp, inner.num_buckets);
        let (placed, kicks2) = self.try_place(&mut inner, i1, i2, fp, entry);
        if placed {
            if let Some(keys) = inner.retained_keys.as_mut() {
                keys.insert(key);
            }
            Ok((true, kicks + kicks2))
        } else {
            Err(Error::InsertFailure {
                max_kicks: self.config.max_kicks,
            })
        }
    }

    fn try_place(
        &self,
        inner: &mut Inner<M>,
        i1: u64,
        i2: u64,
        fp: u32,
        entry: ReputationEntry<M>,
    ) -> (bool, u32) {
        let num_buckets = inner.num_buckets;

        for &b in &[i1, i2] {
            for slot in inner.buckets[b as usize].iter_mut() {
                if let Slot::Occupied(existing_fp, existing) = slot {
                    if *existing_fp == fp {
                        *existing = entry;
                        return (true, 0);
                    }
                }
            }
        }

        for &b in &[i1, i2] {
            for slot in inner.buckets[b as usize].iter_mut() {
                if matches!(slot, Slot::Empty) {
                    *slot = Slot::Occupied(fp, entry);
                    inner.size += 1;
                    return (true, 0);
                }
            }
        }

        let mut rng = rand::thread_rng();
        let mut bucket = if rng.gen_bool(0.5) { i1 } else { i2 };
        let mut homeless_fp = fp;
        let mut homeless_entry = entry;
        let mut kicks = 0u32;

        for _ in 0..self.config.max_kicks {
            let slot_idx = rng.gen_range(0..SLOTS_PER_BUCKET);
            let slot = &mut inner.buckets[bucket as usize][slot_idx];
            let placed = Slot::Occupied(homeless_fp, homeless_entry);
            match std::mem::replace(slot, placed) {
                Slot::Empty => {
                    inner.size += 1;
                    return (true, kicks);
                }
                Slot::Occupied(dfp, de) => {
                    kicks += 1;
                    bucket = alt_bucket(bucket, dfp, num_buckets);
                    homeless_fp = dfp;
                    homeless_entry = de;
                }
            }
        }
        (false, kicks)
    }

    /// Fingerprint-mode's secondary false positive rate: a lookup can
    /// match a colliding fingerprint across either of a key's two
    /// candidate buckets, so the rate scales with `2 * load_factor` over
    /// the fingerprint space.
    pub fn estimate_fpr(&self) -> f64 {
        let load = self.load_factor();
        let space = 2f64.powi(self.config.fingerprint_bits as i32);
        (2.0 * load / space).min(1.0)
    }

    /// Checks both candidate buckets for a matching fingerprint.
    /// Because fingerprints, not full keys, are stored, this carries a
    /// secondary false positive rate of roughly `2 * load / 2^bits`.
    pub fn lookup(&self, key: IPKey) -> Option<ReputationEntry<M>> {
        let inner = self.inner.read().expect("cuckoo lock poisoned");
        let (i1, fp) = self.candidate_buckets(key, inner.num_buckets);
        let i2 = alt_bucket(i1, fp, inner.num_buckets);
        for &b in &[i1, i2] {
            for slot in inner.buckets[b as usize].iter() {
                if let Slot::Occupied(existing_fp, e) = slot {
                    if *existing_fp == fp {
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

    /// Clears at most one matching slot — never every slot sharing this
    /// fingerprint, which would falsely evict unrelated keys that
    /// happen to collide.
    pub fn remove(&self, key: IPKey) -> bool {
        let mut inner = self.inner.write().expect("cuckoo lock poisoned");
        let (i1, fp) = self.candidate_buckets(key, inner.num_buckets);
        let i2 = alt_bucket(i1, fp, inner.num_buckets);
        for &b in &[i1, i2] {
            for slot in inner.buckets[b as usize].iter_mut() {
                if let Slot::Occupied(existing_fp, _) = slot {
                    if *existing_fp == fp {
                        *slot = Slot::Empty;
                        inner.size -= 1;
                        if let Some(keys) = inner.retained_keys.as_mut() {
                            keys.remove(&key);
                        }
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

    pub fn size(&self) -> u64 {
        self.inner.read().expect("cuckoo lock poisoned").size
    }

    pub fn num_buckets(&self) -> u64 {
        self.inner.read().expect("cuckoo lock poisoned").num_buckets
    }

    pub fn rehash_count(&self) -> u64 {
        self.inner.read().expect("cuckoo lock poisoned").rehash_count
    }

    /// Retained true keys, if `retain_keys` was configured. `None` means
    /// this table cannot support a Bloom rebuild from live keys.
    pub fn retained_keys(&self) -> Option<Vec<IPKey>> {
        self.inner
            .read()
            .expect("cuckoo lock poisoned")
            .retained_keys
            .as_ref()
            .map(|set| set.iter().copied().collect())
    }

    /// Allocates a larger bucket array and re-inserts every retained key.
    /// Requires `retain_keys = true`, for the same reason growth during
    /// `insert` does (see `rehash_locked`).
    pub fn rehash(&self, requested_buckets: u64) -> Result<(), Error> {
        let mut inner = self.inner.write().expect("cuckoo lock poisoned");
        self.rehash_locked(&mut inner, requested_buckets)
    }

    /// A fingerprint's alternate bucket is derived from its own hash, but
    /// which bucket it started in depends on `hash1(key)` — not
    /// recoverable from the fingerprint alone. So unlike `ExactKeyTable`,
    /// this table cannot rehome its existing slots in place; it can only
    /// rebuild from the retained key set, which is why `retain_keys` is
    /// mandatory for any table that is ever expected to grow.
    fn rehash_locked(&self, inner: &mut Inner<M>, requested_buckets: u64) -> Result<(), Error> {
        let retained = inner.retained_keys.clone().ok_or_else(|| {
            Error::AllocationFailure(
                "fingerprint-mode rehash needs retain_keys=true to recompute bucket placement"
                    .into(),
            )
        })?;
        let candidate = next_power_of_two(requested_buckets).max(
            next_power_of_two(inner.num_buckets.saturating_mul(self.config.growth_factor as u64)),
        );
        self.rehash_from_keys(inner, retained, candidate)
    }

    fn rehash_from_keys(
        &self,
        inner: &mut Inner<M>,
        keys: HashSet<IPKey>,
        start_candidate: u64,
    ) -> Result<(), Error> {
        let entries: Vec<(IPKey, u32, ReputationEntry<M>)> = keys
            .iter()
            .filter_map(|&k| self.lookup_fp_locked(inner, k).map(|(fp, e)| (k, fp, e)))
            .collect();

        let mut candidate = start_candidate;
        for _ in 0..3 {
            let mut attempt = Inner::new(candidate, true);
            let mut ok = true;
            for (k, _fp, e) in &entries {
                let fp = fingerprint(self.salt, *k, self.config.fingerprint_bits);
                let i1 = double_hash(self.salt, *k).0 % candidate;
                let i2 = alt_bucket(i1, fp, candidate);
                if !self.try_place(&mut attempt, i1, i2, fp, e.clone()).0 {
                    ok = false;
                    break;
                }
                attempt.retained_keys.as_mut().unwrap().insert(*k);
            }
            if ok {
                attempt.rehash_count = inner.rehash_count + 1;
                *inner = attempt;
                return Ok(());
            }
            candidate = next_power_of_two(candidate.saturating_mul(2));
        }
        Err(Error::AllocationFailure(
            "fingerprint-mode rehash exhausted its doubling budget".into(),
        ))
    }

    fn lookup_fp_locked(&self, inner: &Inner<M>, key: IPKey) -> Option<(u32, ReputationEntry<M>)> {
        let fp = fingerprint(self.salt, key, self.config.fingerprint_bits);
        let i1 = double_hash(self.salt, key).0 % inner.num_buckets;
        let i2 = alt_bucket(i1, fp, inner.num_buckets);
        for &b in &[i1, i2] {
            for slot in inner.buckets[b as usize].iter() {
                if let Slot::Occupied(existing_fp, e) = slot {
                    if *existing_fp == fp {
                        return Some((fp, e.clone()));
                    }
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(k: u128) -> ReputationEntry<Vec<u8>> {
        ReputationEntry::new(IPKey(k), 0, None)
    }

    #[test]
    fn insert_then_lookup_roundtrips() {
        let table: FingerprintTable<Vec<u8>> =
            FingerprintTable::new(FingerprintTableConfig::default(), 1).unwrap();
        table.insert(IPKey(1), entry(1)).unwrap();
        assert!(table.lookup(IPKey(1)).is_some());
    }

    #[test]
    fn remove_clears_at_most_one_slot() {
        let table: FingerprintTable<Vec<u8>> =
            FingerprintTable::new(FingerprintTableConfig::default(), 1).unwrap();
        table.insert(IPKey(10), entry(10)).unwrap();
        assert_eq!(table.size(), 1);
        assert!(table.remove(IPKey(10)));
        assert_eq!(table.size(), 0);
        assert!(!table.remove(IPKey(10)));
    }

    #[test]
    fn rehash_with_retained_keys_preserves_lookups() {
        let config = FingerprintTableConfig {
            initial_buckets: 8,
            retain_keys: true,
            ..Default::default()
        };
        let table: FingerprintTable<Vec<u8>> = FingerprintTable::new(config, 1).unwrap();
        for i in 0..2_000u128 {
            table.insert(IPKey(i), entry(i)).unwrap();
        }
        for i in 0..2_000u128 {
            assert!(table.lookup(IPKey(i)).is_some(), "lost key {i}");
        }
    }

    #[test]
    fn rejects_invalid_fingerprint_bits() {
        let config = FingerprintTableConfig {
            fingerprint_bits: 40,
            ..Default::default()
        };
        assert!(FingerprintTable::<Vec<u8>>::new(config, 1).is_err());
    }

    #[test]
    fn rejects_in_range_but_not_enumerated_fingerprint_bits() {
        for bits in [9, 10, 11, 13, 14, 15] {
            let config = FingerprintTableConfig {
                fingerprint_bits: bits,
                ..Default::default()
            };
            assert!(
                FingerprintTable::<Vec<u8>>::new(config, 1).is_err(),
                "fingerprint_bits={bits} should be rejected"
            );
        }
        for bits in [8, 12, 16] {
            let config = FingerprintTableConfig {
                fingerprint_bits: bits,
                ..Default::default()
            };
            assert!(FingerprintTable::<Vec<u8>>::new(config, 1).is_ok());
        }
    }

    #[test]
    fn estimate_fpr_grows_with_load_and_shrinks_with_wider_fingerprints() {
        let narrow = FingerprintTable::<Vec<u8>>::new(
            FingerprintTableConfig {
                initial_buckets: 1024,
                fingerprint_bits: 8,
                ..Default::default()
            },
            1,
        )
        .unwrap();
        let wide = FingerprintTable::<Vec<u8>>::new(
            FingerprintTableConfig {
                initial_buckets: 1024,
                fingerprint_bits: 16,
                ..Default::default()
            },
            1,
        )
        .unwrap();
        assert_eq!(narrow.estimate_fpr(), 0.0);
        for i in 0..1000u128 {
            narrow.insert(IPKey(i), entry(i)).unwrap();
            wide.insert(IPKey(i), entry(i)).unwrap();
        }
        assert!(narrow.estimate_fpr() > 0.0);
        assert!(narrow.estimate_fpr() > wide.estimate_fpr());
    }

    #[test]
    fn kicks_are_reported_from_insert() {
        let config = FingerprintTableConfig {
            initial_buckets: 8,
            ..Default::default()
        };
        let table: FingerprintTable<Vec<u8>> = FingerprintTable::new(config, 1).unwrap();
        let mut total_kicks = 0u32;
        for i in 0..40u128 {
            let (placed, kicks) = table.insert(IPKey(i), entry(i)).unwrap();
            assert!(placed);
            total_kicks += kicks;
        }
        assert!(total_kicks > 0, "expected at least one eviction chain to fire");
    }
}
