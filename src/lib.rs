//! # snaptree
//!
//! Concurrency-safe, structure-sharing key/value storage for object
//! containers: service registries, per-type caches and scope instance stores.
//!
//! ## Components
//!
//! 1. **[`HashTree`]**: an immutable AVL tree ordered by signed 32-bit key
//!    hash, with per-node conflict lists for colliding keys. Every update
//!    returns a new tree sharing all untouched subtrees with the old one.
//!
//! 2. **[`SwapCell`]**: holds the current snapshot and publishes new ones by
//!    compare-and-set with a bounded retry count. Readers never block.
//!
//! 3. **Scope stores** ([`MemoStore`], [`SingletonStore`]): run a value
//!    factory at most once per integer id, even under concurrent first
//!    access, and release owned values in reverse creation order on teardown.
//!
//! ## Example
//!
//! ```rust
//! use snaptree::{HashTree, SharedMap};
//!
//! let registry: SharedMap<&str, u32> = SharedMap::new();
//! registry.add_or_update("logger", 1).unwrap();
//!
//! let before = registry.snapshot();
//! registry.add_or_update("db", 2).unwrap();
//!
//! assert_eq!(before.len(), 1);
//! assert_eq!(registry.get(&"db"), Some(2));
//!
//! let tree: HashTree<&str, u32> = before.add_or_update("cache", 3);
//! assert_eq!(tree.iter().count(), 2);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cell;
pub mod error;
pub mod hash;
pub mod shared;
pub mod store;
pub mod tree;

#[cfg(test)]
mod proptests;

pub use cell::SwapCell;
pub use error::{Error, ReleaseError, Result};
pub use hash::{FxKeys, IdentityKeys, KeyHasher};
pub use shared::SharedMap;
pub use store::{MemoStore, Release, ScopeStore, SingletonStore};
pub use tree::{HashTree, IntTree};

/// Tuning knobs shared by the cell-backed types.
#[derive(Debug, Clone)]
pub struct Config {
    /// Transform attempts per snapshot swap before reporting contention.
    pub swap_retries: usize,
    /// Slots per bucket in [`SingletonStore`]; ids below it are indexed directly.
    pub bucket_width: usize,
    /// Number of creation locks shared by a [`SingletonStore`].
    pub lock_pool_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            swap_retries: cell::DEFAULT_SWAP_RETRIES,
            bucket_width: 32,
            lock_pool_size: 16,
        }
    }
}


#[cfg(test)]
mod stress_tests {
    use super::*;
    use rand::seq::SliceRandom;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn test_large_shuffled_tree() {
        let mut keys: Vec<i32> = (0..10_000).map(|i| i * 3 - 15_000).collect();
        keys.shuffle(&mut StdRng::seed_from_u64(7));

        let mut tree = IntTree::new();
        for &k in &keys {
            tree = tree.add_or_update(k, k as i64 * 2);
        }
        assert_eq!(tree.len(), 10_000);
        assert!(tree.verify_integrity().is_empty());
        // AVL bound: height < 1.45 * log2(n + 2).
        assert!(tree.height() <= 19, "height {}", tree.height());

        let mut correct = 0;
        for &k in &keys {
            if tree.get(&k) == Some(&(k as i64 * 2)) {
                correct += 1;
            }
        }
        assert_eq!(correct, 10_000, "Only {}/10000 correct", correct);

        let hashes: Vec<i32> = tree.keys().copied().collect();
        assert!(hashes.windows(2).all(|w| w[0] < w[1]));

        keys.shuffle(&mut StdRng::seed_from_u64(11));
        for &k in &keys[..5_000] {
            tree = tree.remove(&k);
        }
        assert_eq!(tree.len(), 5_000);
        assert!(tree.verify_integrity().is_empty());
        for &k in &keys[5_000..] {
            assert!(tree.contains_key(&k));
        }
    }

    #[test]
    fn test_string_keys() {
        let tree: HashTree<String, usize> = (0..2_000)
            .map(|i| (format!("domain{}.com/path/{}", i % 100, i), i))
            .collect();
        assert_eq!(tree.len(), 2_000);
        assert!(tree.verify_integrity().is_empty());
        for i in 0..2_000 {
            let key = format!("domain{}.com/path/{}", i % 100, i);
            assert_eq!(tree.get(&key), Some(&i));
        }
    }
}
