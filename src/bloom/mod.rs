//! The Bloom pre-filter: a bit-packed, probabilistic membership test
//! that never produces false negatives. This is the first thing every
//! query touches (`ReputationManager::fast_check`), so it has to stay
//! O(k) and allocation-free on the read path.

use std::sync::RwLock;

use crate::error::Error;
use crate::hash::{double_hash, kirsch_mitzenmacher_position};
use crate::salt::Salt;
use crate::types::IPKey;

/// Sizing derived from an expected capacity and a target false positive
/// rate, independent of any concrete filter instance. Split out (rather
/// than inlined into the constructor) because callers sometimes want to
/// pre-compute sizing — e.g. capacity planning — without allocating a
/// filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BloomParams {
    pub m_bits: u64,
    pub k_hash: u32,
}

impl BloomParams {
    /// `m = ceil(-n * ln(p) / (ln 2)^2)`, clamped to at least 8 bits;
    /// `k = max(1, round((m/n) * ln 2))`.
    pub fn for_capacity(expected_items: u64, target_fpr: f64) -> Result<Self, Error> {
        if expected_items == 0 {
            return Err(Error::InvalidConfig(
                "expected_items must be positive".into(),
            ));
        }
        if !(target_fpr > 0.0 && target_fpr < 1.0) {
            return Err(Error::InvalidConfig(
                "target_fpr must be in (0, 1)".into(),
            ));
        }
        let ln2_sq = std::f64::consts::LN_2 * std::f64::consts::LN_2;
        let m = (-(expected_items as f64) * target_fpr.ln() / ln2_sq).ceil();
        let m_bits = (m as u64).max(8);
        let k_hash = (((m_bits as f64 / expected_items as f64) * std::f64::consts::LN_2).round()
            as u32)
            .max(1);
        Ok(BloomParams { m_bits, k_hash })
    }
}

struct Bits {
    bytes: Vec<u8>,
    inserted_count: u64,
}

/// A bit-packed Bloom filter with Kirsch-Mitzenmacher double hashing.
///
/// `m`, `k`, and `salt` are immutable for the instance's lifetime; only
/// the bit array and the insert counter are mutated, and only under the
/// write half of an `RwLock` — readers take the read half. Because bits
/// are only ever set, never cleared, within one instance, a reader that
/// observes a partially completed `insert` can only under-count set
/// bits, which can only turn a true positive into a (temporary) false
/// negative for *that one racing key* until the writer finishes; it can
/// never turn a genuinely absent key into a positive. The writer sets
/// all `k` bits before releasing the lock, closing that window.
pub struct BloomFilter {
    bits: RwLock<Bits>,
    m: u64,
    k: u32,
    salt: Salt,
}

impl BloomFilter {
    /// Constructs an empty filter with explicit `m`/`k`/`salt`.
    pub fn new(m_bits: u64, k_hash: u32, salt: Salt) -> Result<Self, Error> {
        if m_bits < 8 {
            return Err(Error::InvalidConfig("m_bits must be >= 8".into()));
        }
        if k_hash == 0 {
            return Err(Error::InvalidConfig("k_hash must be >= 1".into()));
        }
        Ok(BloomFilter {
            bits: RwLock::new(Bits {
                bytes: vec![0u8; ((m_bits + 7) / 8) as usize],
                inserted_count: 0,
            }),
            m: m_bits,
            k: k_hash,
            salt,
        })
    }

    /// Constructs a filter sized for `expected_items` at `target_fpr`.
    pub fn for_capacity(expected_items: u64, target_fpr: f64, salt: Salt) -> Result<Self, Error> {
        let params = BloomParams::for_capacity(expected_items, target_fpr)?;
        Self::new(params.m_bits, params.k_hash, salt)
    }

    fn positions(&self, key: IPKey) -> impl Iterator<Item = u64> + '_ {
        let (h1, h2) = double_hash(self.salt, key);
        (0..self.k).map(move |i| kirsch_mitzenmacher_position(h1, h2, i, self.m))
    }

    /// Sets the `k` bits derived from `key`. Observable by this thread's
    /// own subsequent `might_contain` immediately, and by any other
    /// thread no later than its next acquire of the filter's lock.
    pub fn insert(&self, key: IPKey) {
        let positions: Vec<u64> = self.positions(key).collect();
        let mut bits = self.bits.write().expect("bloom lock poisoned");
        for pos in positions {
            let byte = (pos / 8) as usize;
            let bit = (pos % 8) as u8;
            bits.bytes[byte] |= 1 << bit;
        }
        bits.inserted_count += 1;
    }

    /// `false` means the key was definitely never inserted. `true` means
    /// either the key was inserted, or this is a false positive with
    /// probability bounded by `target_fpr` under the expected load.
    pub fn might_contain(&self, key: IPKey) -> bool {
        let bits = self.bits.read().expect("bloom lock poisoned");
        self.positions(key).all(|pos| {
            let byte = (pos / 8) as usize;
            let bit = (pos % 8) as u8;
            (bits.bytes[byte] & (1 << bit)) != 0
        })
    }

    /// `(1 - e^(-k*n/m))^k`, using the instance's live `inserted_count`.
    pub fn estimate_fpr(&self) -> f64 {
        let n = self.bits.read().expect("bloom lock poisoned").inserted_count as f64;
        if n == 0.0 {
            return 0.0;
        }
        let exponent = -(self.k as f64) * n / self.m as f64;
        (1.0 - exponent.exp()).powi(self.k as i32)
    }

    pub fn m(&self) -> u64 {
        self.m
    }

    pub fn k(&self) -> u32 {
        self.k
    }

    pub fn salt(&self) -> Salt {
        self.salt
    }

    pub fn inserted_count(&self) -> u64 {
        self.bits.read().expect("bloom lock poisoned").inserted_count
    }
}
