//! Shared hashing primitives for the Bloom pre-filter and the Cuckoo
//! table: the two base hashes behind Kirsch-Mitzenmacher double hashing,
//! and the fingerprint derivation behind partial-key cuckoo hashing.
//!
//! Both schemes are keyed by the salt the Bloom filter and Cuckoo table
//! share, so a rebuild that reuses the salt reproduces exactly the same
//! bit positions / bucket indices for a given key.

use siphasher::sip::SipHasher13;
use std::hash::Hasher;

use crate::salt::Salt;
use crate::types::IPKey;

/// Two independent 64-bit hashes of `salt ‖ key`, discriminated by
/// `seed` so `h1`/`h2` are computed from distinct keyed instances rather
/// than derived from one another. 64 bits of hash is ample headroom for
/// any `m`/`num_buckets` this crate will realistically size to; a wider,
/// true 128-bit hash would only spend more cycles for no additional
/// collision resistance at these table sizes.
fn base_hash(salt: Salt, seed: u8, key: IPKey) -> u64 {
    let salt_lo = salt as u64;
    let salt_hi = (salt >> 64) as u64;
    // Fold the seed into both halves of the key so seed=0 and seed=1
    // address genuinely distinct SipHash instances, not a rotation of
    // the same one.
    let k0 = salt_lo ^ (seed as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15);
    let k1 = salt_hi.rotate_left(seed as u32 * 17);
    let mut hasher = SipHasher13::new_with_keys(k0, k1);
    hasher.write_u128(key.as_u128());
    hasher.finish()
}

/// The two base hashes `h1`, `h2` used by both the Bloom filter's
/// Kirsch-Mitzenmacher derivation and the Cuckoo table's bucket
/// addressing.
pub fn double_hash(salt: Salt, key: IPKey) -> (u64, u64) {
    (base_hash(salt, 0, key), base_hash(salt, 1, key))
}

/// Derives the `i`-th of `k` Bloom bit positions via Kirsch-Mitzenmacher:
/// `position_i = (h1 + i * h2) mod m`.
pub fn kirsch_mitzenmacher_position(h1: u64, h2: u64, i: u32, m: u64) -> u64 {
    let combined = (h1 as u128).wrapping_add((i as u128).wrapping_mul(h2 as u128));
    (combined % m as u128) as u64
}

/// Derives a non-zero `bits`-wide fingerprint for partial-key cuckoo
/// hashing. Zero is reserved to mark an empty slot, so a hash that lands
/// on zero is bumped to one rather than rejected — matching the
/// fixed-cost derivation the paper and every production cuckoo filter in
/// the retrieved pack (e.g. `examples/dispanser-partition-index/src/filter/cuckoo/mod.rs::fingerprint`)
/// rely on, except we pick the non-zero bit deterministically instead of
/// re-hashing in a loop.
pub fn fingerprint(salt: Salt, key: IPKey, bits: u8) -> u32 {
    debug_assert!((1..=32).contains(&bits));
    let h = base_hash(salt, 2, key);
    let mask = if bits == 32 { u32::MAX } else { (1u32 << bits) - 1 };
    let fp = (h as u32) & mask;
    if fp == 0 {
        1
    } else {
        fp
    }
}

/// `i2 = i1 XOR (hash(fingerprint) mod num_buckets)` — the partial-key
/// cuckoo hashing property that lets an eviction recompute the alternate
/// bucket from a stored fingerprint alone, without the original key.
pub fn alt_bucket(i1: u64, fingerprint: u32, num_buckets: u64) -> u64 {
    let h = {
        let mut hasher = SipHasher13::new_with_keys(0x5bd1_e995, 0xc2b2_ae35);
        hasher.write_u32(fingerprint);
        hasher.finish()
    };
    i1 ^ (h % num_buckets)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_is_never_zero() {
        for i in 0..10_000u128 {
            let fp = fingerprint(42, IPKey(i), 16);
            assert_ne!(fp, 0);
        }
    }

    #[test]
    fn alt_bucket_is_its_own_inverse() {
        for num_buckets in [8u64, 16, 1024] {
            for i in 0..1000u128 {
                let key = IPKey(i);
                let fp = fingerprint(7, key, 16);
                let (h1, _) = double_hash(7, key);
                let i1 = h1 % num_buckets;
                let i2 = alt_bucket(i1, fp, num_buckets);
                let back = alt_bucket(i2, fp, num_buckets);
                assert_eq!(i1, back, "XOR involution broken for bucket {i1}");
            }
        }
    }

    mod prop {
        use super::*;
        use proptest::prelude::*;

        fn bucket_roundtrip(key: u128, buckets: u64) {
            let fp = fingerprint(11, IPKey(key), 16);
            let i1 = double_hash(11, IPKey(key)).0 % buckets;
            let i2 = alt_bucket(i1, fp, buckets);
            let back = alt_bucket(i2, fp, buckets);
            assert_eq!(i1, back, "XOR involution broken: {i1} != {back}");
        }

        proptest! {
            #[test]
            fn bucket_roundtrip_prop(key in 0u128..u128::MAX, buckets in 3u64..1_000_000) {
                bucket_roundtrip(key, buckets);
            }

            #[test]
            fn bucket_roundtrip_prop_pow_of_2(key in 0u128..u128::MAX, pow in 3u32..24) {
                bucket_roundtrip(key, 2u64.pow(pow));
            }
        }
    }

    #[test]
    fn same_salt_reproduces_same_positions() {
        let key = IPKey(123456789);
        let (h1a, h2a) = double_hash(99, key);
        let (h1b, h2b) = double_hash(99, key);
        assert_eq!(h1a, h1b);
        assert_eq!(h2a, h2b);
    }
}
