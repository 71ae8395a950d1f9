//! Tree-backed scope store for arbitrary ids.

use std::sync::Arc;

use parking_lot::ReentrantMutex;

use super::{Lifecycle, Release, ScopeStore, Slot};
use crate::cell::SwapCell;
use crate::error::Result;
use crate::hash::IdentityKeys;
use crate::tree::HashTree;
use crate::Config;

/// A slot with its own creation lock. Reentrant so a factory that asks for
/// its own id gets [`Error::Recursive`](crate::Error::Recursive) instead of a
/// deadlock.
struct LockedSlot<V> {
    lock: ReentrantMutex<()>,
    slot: Slot<V>,
}

impl<V> LockedSlot<V> {
    fn new() -> Self {
        Self {
            lock: ReentrantMutex::new(()),
            slot: Slot::new(),
        }
    }
}

type SlotTree<V> = HashTree<u32, Arc<LockedSlot<V>>, IdentityKeys>;

/// Scope store that maps ids to slots through a published [`HashTree`].
///
/// Each id gets its own lock, so slow factories only block callers waiting on
/// the same id.
///
/// # Example
///
/// ```rust
/// use snaptree::{MemoStore, ScopeStore};
///
/// let store: MemoStore<u64> = MemoStore::new();
/// assert_eq!(store.get_or_create(7, || 42).unwrap(), 42);
/// assert_eq!(store.get_or_create(7, || unreachable!()).unwrap(), 42);
///
/// store.dispose_all();
/// assert!(store.get_or_create(7, || 0).is_err());
/// ```
pub struct MemoStore<V> {
    slots: SwapCell<SlotTree<V>>,
    life: Lifecycle<V>,
}

impl<V: Clone + Release> MemoStore<V> {
    /// Create an empty store with the default configuration.
    pub fn new() -> Self {
        Self::with_config(&Config::default())
    }

    /// Create an empty store using `config.swap_retries` for slot publishing.
    pub fn with_config(config: &Config) -> Self {
        Self {
            slots: SwapCell::with_retries(HashTree::new(), config.swap_retries),
            life: Lifecycle::new(),
        }
    }

    /// Number of ids that have a slot, filled or not.
    pub fn slot_count(&self) -> usize {
        self.slots.peek().len()
    }

    fn existing(&self, id: u32) -> Option<Arc<LockedSlot<V>>> {
        self.slots.peek().get(&id).cloned()
    }

    /// The slot for `id`, publishing a fresh one if needed.
    fn slot(&self, id: u32) -> Result<Arc<LockedSlot<V>>> {
        if let Some(slot) = self.existing(id) {
            return Ok(slot);
        }
        let fresh = Arc::new(LockedSlot::new());
        let replaced = self
            .slots
            .swap_with(|t| t.add_or_keep(id, Arc::clone(&fresh)))?;
        // `add_or_keep` only published `fresh` if the replaced snapshot lacked `id`.
        Ok(match replaced.get(&id) {
            Some(winner) => Arc::clone(winner),
            None => fresh,
        })
    }
}

impl<V: Clone + Release> ScopeStore<V> for MemoStore<V> {
    fn get_or_create<F>(&self, id: u32, factory: F) -> Result<V>
    where
        F: FnOnce() -> V,
    {
        self.life.ensure_active()?;
        if let Some(value) = self.existing(id).and_then(|s| s.slot.peek()) {
            return Ok(value);
        }
        let slot = self.slot(id)?;
        let _guard = slot.lock.lock();
        self.life.create_locked(id, &slot.slot, factory)
    }

    fn get(&self, id: u32) -> Result<Option<V>> {
        self.life.ensure_active()?;
        Ok(self.existing(id).and_then(|s| s.slot.peek()))
    }

    fn set(&self, id: u32, value: V) -> Result<()> {
        self.life.ensure_active()?;
        let slot = self.slot(id)?;
        let _guard = slot.lock.lock();
        self.life.store_locked(id, &slot.slot, value, true)
    }

    fn set_external(&self, id: u32, value: V) -> Result<()> {
        self.life.ensure_active()?;
        let slot = self.slot(id)?;
        let _guard = slot.lock.lock();
        self.life.store_locked(id, &slot.slot, value, false)
    }

    fn dispose_all(&self) {
        if !self.life.begin_dispose() {
            return;
        }
        let tree = self.slots.load();
        let drained = tree
            .values()
            .filter_map(|s| {
                let _guard = s.lock.lock();
                s.slot.take()
            })
            .collect();
        self.life.finish_dispose(drained);
    }

    fn is_disposed(&self) -> bool {
        self.life.is_disposed()
    }
}

impl<V: Clone + Release> Default for MemoStore<V> {
    fn default() -> Self {
        Self::new()
    }
}
