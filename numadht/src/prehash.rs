//! Key prehashing.
//!
//! The prehash is both the directory index source (low bits) and the
//! signature cached next to every record for cheap negative compares.

use core::hash::BuildHasher;
use foldhash::fast::FixedState;

/// Seed used when none is configured.
pub const DEFAULT_SEED: u64 = 0;

/// A deterministic 64-bit hash over key bytes.
pub trait Prehash: Send + Sync {
    /// Hash `key`. Equal bytes must always give equal results.
    fn hash(&self, key: &[u8]) -> u64;
}

/// Seeded foldhash; the default strategy.
#[derive(Clone, Copy)]
pub struct FoldPrehash {
    state: FixedState,
}

impl FoldPrehash {
    /// Foldhash with a fixed `seed`; equal seeds hash equally across runs.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            state: FixedState::with_seed(seed),
        }
    }
}

impl Default for FoldPrehash {
    fn default() -> Self {
        Self::with_seed(DEFAULT_SEED)
    }
}

impl core::fmt::Debug for FoldPrehash {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("FoldPrehash")
    }
}

impl Prehash for FoldPrehash {
    #[inline]
    fn hash(&self, key: &[u8]) -> u64 {
        self.state.hash_one(key)
    }
}

/// Pass-through: the first 8 key bytes as a native-endian `u64`.
///
/// Shorter keys are zero padded. With 8-byte integer keys the signature is
/// the key itself, so directory placement follows the key's low bits.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityPrehash;

impl Prehash for IdentityPrehash {
    #[inline]
    fn hash(&self, key: &[u8]) -> u64 {
        let mut word = [0u8; 8];
        let n = key.len().min(8);
        word[..n].copy_from_slice(&key[..n]);
        u64::from_ne_bytes(word)
    }
}

impl<P: Prehash + ?Sized> Prehash for &P {
    #[inline]
    fn hash(&self, key: &[u8]) -> u64 {
        (**self).hash(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fold_is_deterministic_per_seed() {
        let a = FoldPrehash::default();
        let b = FoldPrehash::with_seed(DEFAULT_SEED);
        assert_eq!(a.hash(b"alpha"), b.hash(b"alpha"));
        assert_ne!(a.hash(b"alpha"), a.hash(b"alphb"));
    }

    #[test]
    fn fold_spreads_low_bits() {
        let h = FoldPrehash::default();
        let mut seen = [0usize; 16];
        for i in 0u64..4096 {
            seen[(h.hash(&i.to_ne_bytes()) & 15) as usize] += 1;
        }
        // 256 expected per bucket.
        assert!(seen.iter().all(|&n| n > 128 && n < 384), "{seen:?}");
    }

    #[test]
    fn identity_passes_integers_through() {
        let h = IdentityPrehash;
        assert_eq!(h.hash(&42u64.to_ne_bytes()), 42);
        assert_eq!(h.hash(&[]), 0);
        assert_eq!(h.hash(&[1]), u64::from_ne_bytes([1, 0, 0, 0, 0, 0, 0, 0]));
        assert_eq!(h.hash(&u64::MAX.to_ne_bytes()), u64::MAX);
    }
}
