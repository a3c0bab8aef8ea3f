//! The Cuckoo exact-membership table: disambiguates Bloom suspects into
//! confirmed-malicious or Bloom-false-positive, and holds the per-IP
//! [`ReputationEntry`] metadata.
//!
//! Two storage modes are exposed:
//!
//! - [`exact::ExactKeyTable`] stores the full `IPKey` per slot. This is
//!   what [`crate::manager::ReputationManager`] uses by default, because
//!   only exact-key storage lets a Bloom rebuild re-insert true keys
//!   straight from the table.
//! - [`fingerprint::FingerprintTable`] stores only a narrow fingerprint
//!   per slot to save memory, at the cost of a small secondary lookup
//!   FPR and of needing an auxiliary key set (kept by the Manager) if a
//!   Bloom rebuild is ever required in that mode.

pub mod exact;
pub mod fingerprint;

use crate::types::{IPKey, Timestamp};

/// Fixed at 4 per Fan et al. (2014), "Cuckoo Filter: Practically Better
/// Than Bloom".
pub const SLOTS_PER_BUCKET: usize = 4;

/// The value stored in the Cuckoo table for each known-malicious key.
/// `first_seen` is set once on insert and never mutated; `last_seen` is
/// non-decreasing across updates. `metadata` is treated as an opaque
/// blob by the core.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ReputationEntry<M = Vec<u8>> {
    pub ip_key: IPKey,
    pub first_seen: Timestamp,
    pub last_seen: Timestamp,
    pub metadata: Option<M>,
}

impl<M> ReputationEntry<M> {
    pub fn new(ip_key: IPKey, seen_at: Timestamp, metadata: Option<M>) -> Self {
        ReputationEntry {
            ip_key,
            first_seen: seen_at,
            last_seen: seen_at,
            metadata,
        }
    }
}

impl<M: serde::Serialize> ReputationEntry<M> {
    /// Encodes this entry, opaque metadata included, for callers that
    /// ship entries across a process boundary (e.g. replicating a
    /// report to a peer instance).
    pub fn to_bincode(&self) -> Result<Vec<u8>, crate::error::Error> {
        bincode::serialize(self).map_err(|e| crate::error::Error::Serialization(e.to_string()))
    }
}

impl<M: serde::de::DeserializeOwned> ReputationEntry<M> {
    pub fn from_bincode(bytes: &[u8]) -> Result<Self, crate::error::Error> {
        bincode::deserialize(bytes).map_err(|e| crate::error::Error::Serialization(e.to_string()))
    }
}

// `serde` needs `IPKey` to be (de)serializable for `ReputationEntry` to
// derive it; `IPKey` is a newtype over `u128`, trivially representable.
impl serde::Serialize for IPKey {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_u128(self.0)
    }
}

impl<'de> serde::Deserialize<'de> for IPKey {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        u128::deserialize(deserializer).map(IPKey)
    }
}

/// Rounds `n` up to the next power of two, with a floor of 1 — used
/// whenever a requested bucket/slot count must satisfy the "always a
/// power of two" sizing invariant.
pub(crate) fn next_power_of_two(n: u64) -> u64 {
    n.max(1).next_power_of_two()
}
