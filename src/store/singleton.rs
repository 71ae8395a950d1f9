//! Bucketed scope store for dense, sequential ids.
//!
//! Ids below the bucket width index a flat slot array directly. Larger ids
//! land in overflow buckets of the same width, allocated on first use and
//! published through a [`SwapCell`], so growing the table never blocks
//! readers. The table is a [`HashTree`] keyed by bucket index, so a stray
//! large id costs one bucket, not a run of empty ones. Creation locks come
//! from a small fixed pool keyed by `id % pool_size`.

use std::ops::Deref;
use std::sync::Arc;

use parking_lot::ReentrantMutex;
use tracing::trace;

use super::{Entry, Lifecycle, Release, ScopeStore, Slot};
use crate::cell::SwapCell;
use crate::error::Result;
use crate::hash::IdentityKeys;
use crate::tree::HashTree;
use crate::Config;

type Bucket<V> = Arc<[Slot<V>]>;

/// Overflow buckets; bucket `i` covers ids `(i + 1) * width .. (i + 2) * width`.
type BucketTable<V> = HashTree<u32, Bucket<V>, IdentityKeys>;

/// A slot borrowed from the flat array or held through its bucket.
enum SlotRef<'a, V> {
    Flat(&'a Slot<V>),
    Overflow(Bucket<V>, usize),
}

impl<V> Deref for SlotRef<'_, V> {
    type Target = Slot<V>;

    fn deref(&self) -> &Slot<V> {
        match self {
            SlotRef::Flat(slot) => slot,
            SlotRef::Overflow(bucket, offset) => &bucket[*offset],
        }
    }
}

/// Scope store indexed by id, tuned for the whole-container singleton case.
///
/// Lock pool slots are reentrant, so a factory may create another id that
/// shares its lock on the same thread.
///
/// # Example
///
/// ```rust
/// use snaptree::{Config, ScopeStore, SingletonStore};
///
/// let store: SingletonStore<String> = SingletonStore::with_config(&Config {
///     bucket_width: 4,
///     ..Config::default()
/// });
/// let hello = store.get_or_create(2, || "hello".to_string()).unwrap();
/// let far = store.get_or_create(1_000, || "far".to_string()).unwrap();
/// assert_eq!(store.get(2).unwrap(), Some(hello));
/// assert_eq!(store.get(1_000).unwrap(), Some(far));
/// ```
pub struct SingletonStore<V> {
    flat: Box<[Slot<V>]>,
    overflow: SwapCell<BucketTable<V>>,
    width: usize,
    locks: Box<[ReentrantMutex<()>]>,
    life: Lifecycle<V>,
}

impl<V: Clone + Release> SingletonStore<V> {
    /// Create an empty store with the default configuration.
    pub fn new() -> Self {
        Self::with_config(&Config::default())
    }

    /// Create an empty store with `config.bucket_width` slots per bucket and
    /// `config.lock_pool_size` creation locks.
    pub fn with_config(config: &Config) -> Self {
        let width = config.bucket_width.max(1);
        let pool = config.lock_pool_size.max(1);
        Self {
            flat: (0..width).map(|_| Slot::new()).collect(),
            overflow: SwapCell::with_retries(HashTree::new(), config.swap_retries),
            width,
            locks: (0..pool).map(|_| ReentrantMutex::new(())).collect(),
            life: Lifecycle::new(),
        }
    }

    /// Number of overflow buckets allocated so far.
    pub fn bucket_count(&self) -> usize {
        self.overflow.peek().len()
    }

    fn lock_for(&self, id: u32) -> &ReentrantMutex<()> {
        &self.locks[id as usize % self.locks.len()]
    }

    /// Split an overflow id into bucket index and offset.
    #[inline]
    fn locate(&self, id: usize) -> (u32, usize) {
        // `id / width` is at most `u32::MAX` because `id` came from a `u32`.
        ((id / self.width - 1) as u32, id % self.width)
    }

    /// The slot for `id`, or `None` if its bucket was never allocated.
    fn existing_slot(&self, id: u32) -> Option<SlotRef<'_, V>> {
        let id = id as usize;
        if id < self.width {
            return Some(SlotRef::Flat(&self.flat[id]));
        }
        let (index, offset) = self.locate(id);
        let bucket = self.overflow.peek().get(&index).cloned()?;
        Some(SlotRef::Overflow(bucket, offset))
    }

    /// The slot for `id`, allocating its bucket if needed.
    fn slot(&self, id: u32) -> Result<SlotRef<'_, V>> {
        if let Some(slot) = self.existing_slot(id) {
            return Ok(slot);
        }
        let (index, offset) = self.locate(id as usize);
        Ok(SlotRef::Overflow(self.grow(index)?, offset))
    }

    /// Publish bucket `index` if absent, returning the bucket the table holds.
    fn grow(&self, index: u32) -> Result<Bucket<V>> {
        let fresh = new_bucket(self.width);
        let replaced = self
            .overflow
            .swap_with(|table| table.add_or_keep(index, Arc::clone(&fresh)))?;
        // `add_or_keep` only published `fresh` if the replaced table lacked it.
        Ok(match replaced.get(&index) {
            Some(winner) => Arc::clone(winner),
            None => {
                trace!(bucket = index, "grew singleton bucket table");
                fresh
            }
        })
    }

    fn drain(&self, id: usize, slot: &Slot<V>, out: &mut Vec<Arc<Entry<V>>>) {
        let _guard = self.lock_for(id as u32).lock();
        out.extend(slot.take());
    }
}

fn new_bucket<V>(width: usize) -> Bucket<V> {
    (0..width).map(|_| Slot::new()).collect()
}

impl<V: Clone + Release> ScopeStore<V> for SingletonStore<V> {
    fn get_or_create<F>(&self, id: u32, factory: F) -> Result<V>
    where
        F: FnOnce() -> V,
    {
        self.life.ensure_active()?;
        let slot = self.slot(id)?;
        if let Some(value) = slot.peek() {
            return Ok(value);
        }
        let _guard = self.lock_for(id).lock();
        self.life.create_locked(id, &slot, factory)
    }

    fn get(&self, id: u32) -> Result<Option<V>> {
        self.life.ensure_active()?;
        Ok(self.existing_slot(id).and_then(|slot| slot.peek()))
    }

    fn set(&self, id: u32, value: V) -> Result<()> {
        self.life.ensure_active()?;
        let slot = self.slot(id)?;
        let _guard = self.lock_for(id).lock();
        self.life.store_locked(id, &slot, value, true)
    }

    fn set_external(&self, id: u32, value: V) -> Result<()> {
        self.life.ensure_active()?;
        let slot = self.slot(id)?;
        let _guard = self.lock_for(id).lock();
        self.life.store_locked(id, &slot, value, false)
    }

    fn dispose_all(&self) {
        if !self.life.begin_dispose() {
            return;
        }
        let mut drained = Vec::new();
        for (id, slot) in self.flat.iter().enumerate() {
            self.drain(id, slot, &mut drained);
        }
        let table = self.overflow.load();
        for (&index, bucket) in table.iter() {
            let base = (index as usize + 1) * self.width;
            for (offset, slot) in bucket.iter().enumerate() {
                self.drain(base + offset, slot, &mut drained);
            }
        }
        self.life.finish_dispose(drained);
    }

    fn is_disposed(&self) -> bool {
        self.life.is_disposed()
    }
}

impl<V: Clone + Release> Default for SingletonStore<V> {
    fn default() -> Self {
        Self::new()
    }
}
