//! A concurrent map built from a [`HashTree`] behind a [`SwapCell`].
//!
//! This is the shape of every registry and per-type cache: reads go straight
//! to the current snapshot, writes publish a new one.

use std::sync::Arc;

use crate::cell::SwapCell;
use crate::error::Result;
use crate::hash::{FxKeys, KeyHasher};
use crate::tree::HashTree;
use crate::Config;

/// Thread-safe map with lock-free reads and optimistic writes.
///
/// # Example
///
/// ```rust
/// use snaptree::SharedMap;
///
/// let cache: SharedMap<&str, u32> = SharedMap::new();
/// assert_eq!(cache.add_or_keep("answer", 42).unwrap(), 42);
/// assert_eq!(cache.add_or_keep("answer", 7).unwrap(), 42);
/// assert_eq!(cache.get(&"answer"), Some(42));
/// ```
pub struct SharedMap<K, V, H = FxKeys> {
    tree: SwapCell<HashTree<K, V, H>>,
}

impl<K, V, H: Default> SharedMap<K, V, H> {
    /// Create an empty map with the default configuration.
    pub fn new() -> Self {
        Self::with_config(&Config::default())
    }

    /// Create an empty map using `config.swap_retries`.
    pub fn with_config(config: &Config) -> Self {
        Self {
            tree: SwapCell::with_retries(HashTree::new(), config.swap_retries),
        }
    }
}

impl<K, V, H> SharedMap<K, V, H> {
    /// The current snapshot. Later writes do not affect it.
    pub fn snapshot(&self) -> Arc<HashTree<K, V, H>> {
        self.tree.load()
    }

    /// Number of entries in the current snapshot.
    pub fn len(&self) -> usize {
        self.tree.peek().len()
    }

    /// `true` if the current snapshot is empty.
    pub fn is_empty(&self) -> bool {
        self.tree.peek().is_empty()
    }
}

impl<K, V, H> SharedMap<K, V, H>
where
    K: Clone,
    V: Clone,
    H: KeyHasher<K> + Clone,
{
    /// Clone of the value stored under `key`.
    pub fn get(&self, key: &K) -> Option<V> {
        self.tree.peek().get(key).cloned()
    }

    /// Store `value` under `key`, replacing any previous value.
    pub fn add_or_update(&self, key: K, value: V) -> Result<()> {
        self.tree
            .swap_with(|t| t.add_or_update(key.clone(), value.clone()))
            .map(drop)
    }

    /// Store `value` under `key`, combining with an existing value through `merge`.
    pub fn add_or_update_with<F>(&self, key: K, value: V, merge: F) -> Result<()>
    where
        F: Fn(&K, &V, V) -> V,
    {
        self.tree
            .swap_with(|t| t.add_or_update_with(key.clone(), value.clone(), &merge))
            .map(drop)
    }

    /// Return the value under `key`, storing `value` first if the key is absent.
    ///
    /// When two threads race, both get the value that won.
    pub fn add_or_keep(&self, key: K, value: V) -> Result<V> {
        if let Some(existing) = self.get(&key) {
            return Ok(existing);
        }
        let tree = self
            .tree
            .update(|t| t.add_or_keep(key.clone(), value.clone()))?;
        Ok(tree.get(&key).cloned().unwrap_or(value))
    }

    /// Remove `key`. Returns `true` if it was present.
    pub fn remove(&self, key: &K) -> Result<bool> {
        let old = self.tree.swap_with(|t| t.remove(key))?;
        Ok(old.contains_key(key))
    }
}

impl<K, V, H: Default> Default for SharedMap<K, V, H> {
    fn default() -> Self {
        Self::new()
    }
}
