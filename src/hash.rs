//! Key hashing capabilities.
//!
//! The tree never calls `Hash` or `Eq` directly. Every key operation goes
//! through a [`KeyHasher`], so integer-keyed trees can use the key itself as
//! the hash and tests can force collisions.

use std::hash::{Hash, Hasher};

use rustc_hash::FxHasher;

/// Hash and equality for tree keys.
///
/// Hashes are signed 32-bit and ordered as signed integers, so negative hashes
/// sort before zero.
pub trait KeyHasher<K: ?Sized> {
    /// Hash used to position the key in the tree.
    fn hash_of(&self, key: &K) -> i32;

    /// Key identity within a single hash bucket.
    fn equal(&self, a: &K, b: &K) -> bool;
}

/// Default hasher for `Hash + Eq` keys, backed by `FxHasher`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FxKeys;

impl<K: Hash + Eq + ?Sized> KeyHasher<K> for FxKeys {
    #[inline]
    fn hash_of(&self, key: &K) -> i32 {
        let mut hasher = FxHasher::default();
        key.hash(&mut hasher);
        fold(hasher.finish())
    }

    #[inline]
    fn equal(&self, a: &K, b: &K) -> bool {
        a == b
    }
}

/// Hasher for integer keys where the key is its own hash.
///
/// `u32` keys are reinterpreted as `i32`, which is a bijection, so distinct
/// keys never collide.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IdentityKeys;

impl KeyHasher<i32> for IdentityKeys {
    #[inline]
    fn hash_of(&self, key: &i32) -> i32 {
        *key
    }

    #[inline]
    fn equal(&self, a: &i32, b: &i32) -> bool {
        a == b
    }
}

impl KeyHasher<u32> for IdentityKeys {
    #[inline]
    fn hash_of(&self, key: &u32) -> i32 {
        *key as i32
    }

    #[inline]
    fn equal(&self, a: &u32, b: &u32) -> bool {
        a == b
    }
}

/// Fold a 64-bit hash into 32 bits, keeping entropy from both halves.
#[inline]
fn fold(h: u64) -> i32 {
    (h ^ (h >> 32)) as u32 as i32
}
