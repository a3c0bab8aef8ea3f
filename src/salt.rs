//! The salt shared between a Bloom filter and its companion Cuckoo table.
//!
//! The salt is what lets the two structures agree on key identity: it is
//! generated once (or supplied by the caller) and cloned by value into
//! each filter instance. Neither filter ever mutates it in place; a
//! rebuild either carries the *same* salt forward (to keep hashing
//! identities stable: bit positions and bucket indices recompute
//! identically for a given key across a same-salt rebuild)
//! or installs a fresh one when the Manager re-derives everything from
//! scratch.

use rand::RngCore;

pub type Salt = u128;

/// Draws a fresh salt from the thread-local cryptographic RNG.
pub fn generate_salt() -> Salt {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    u128::from_le_bytes(bytes)
}
