//! IP key normalization. The core never stores or hashes the textual
//! address directly — every caller-facing `&str` is turned into a fixed
//! width [`IPKey`] first, which decouples the rest of the system from
//! address family and string parsing.

use sha2::{Digest, Sha256};
use std::net::Ipv4Addr;
use std::str::FromStr;

use crate::error::Error;

/// A 128-bit key derived from the cryptographic hash of a packed address.
///
/// Using a hashed key rather than the raw address gives a uniform
/// distribution for free and means the Bloom/Cuckoo hash layer never has
/// to know anything about IPv4 vs. a widened key in the future.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IPKey(pub u128);

impl IPKey {
    pub fn as_u128(self) -> u128 {
        self.0
    }
}

/// Monotonic timestamp, caller's choice of unit (seconds or nanoseconds).
/// The core only stores and compares these; it never interprets the unit.
pub type Timestamp = i64;

/// Parses a dotted-quad IPv4 string and hashes it into an [`IPKey`].
///
/// This is the only place textual addresses are accepted; everything
/// downstream operates on `IPKey`.
pub fn ip_to_key(ip: &str) -> Result<IPKey, Error> {
    let addr = Ipv4Addr::from_str(ip)
        .map_err(|e| Error::InvalidInput(format!("malformed IPv4 address {ip:?}: {e}")))?;
    Ok(key_from_packed(&addr.octets()))
}

/// Hashes a packed address (already validated by the caller) into an
/// [`IPKey`]. Deterministic and independent of any filter's salt, so the
/// same address always normalizes to the same key across rebuilds.
pub fn key_from_packed(packed: &[u8]) -> IPKey {
    let digest = Sha256::digest(packed);
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&digest[..16]);
    IPKey(u128::from_be_bytes(bytes))
}
