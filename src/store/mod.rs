//! Compute-once scope stores.
//!
//! A scope store maps small integer ids to values and guarantees that the
//! factory for an id runs at most once, even when several threads ask for the
//! same id at the same time. Reads of an existing value never lock; a miss
//! takes a narrow lock, checks again, and only then runs the factory.
//!
//! Two shapes share that contract:
//!
//! - [`MemoStore`]: ids live in a [`HashTree`](crate::HashTree) published
//!   through a [`SwapCell`](crate::SwapCell). Suits sparse ids.
//! - [`SingletonStore`]: ids index a flat array, with lazily grown overflow
//!   buckets. Suits dense, sequentially assigned ids.
//!
//! Teardown goes through [`ScopeStore::dispose_all`], which releases every
//! owned value in reverse creation order and then refuses further use.

mod scoped;
mod singleton;

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{fence, AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use crate::error::{Error, ReleaseError, Result};

pub use scoped::MemoStore;
pub use singleton::SingletonStore;

// =============================================================================
// Release
// =============================================================================

/// Teardown hook run once per owned value by [`ScopeStore::dispose_all`].
///
/// The default does nothing, so plain data only needs an empty impl.
pub trait Release {
    /// Release resources held by this value.
    fn release(&self) -> std::result::Result<(), ReleaseError> {
        Ok(())
    }
}

impl<T: Release + ?Sized> Release for Arc<T> {
    fn release(&self) -> std::result::Result<(), ReleaseError> {
        (**self).release()
    }
}

impl<T: Release + ?Sized> Release for Box<T> {
    fn release(&self) -> std::result::Result<(), ReleaseError> {
        (**self).release()
    }
}

impl<T: Release> Release for Option<T> {
    fn release(&self) -> std::result::Result<(), ReleaseError> {
        match self {
            Some(inner) => inner.release(),
            None => Ok(()),
        }
    }
}

macro_rules! release_noop {
    ($($t:ty),* $(,)?) => {
        $(impl Release for $t {})*
    };
}

release_noop!(
    (), bool, char, u8, u16, u32, u64, u128, usize, i8, i16, i32, i64, i128, isize, f32, f64,
    String, &'static str,
);

// =============================================================================
// ScopeStore
// =============================================================================

/// Contract shared by [`MemoStore`] and [`SingletonStore`].
pub trait ScopeStore<V> {
    /// Return the value for `id`, running `factory` if there is none yet.
    ///
    /// `factory` runs at most once per id. Concurrent callers for the same id
    /// wait for it and receive the same value. Fails with
    /// [`Error::Disposed`] once the store is torn down, and with
    /// [`Error::Recursive`] if `factory` asks for `id` itself.
    fn get_or_create<F>(&self, id: u32, factory: F) -> Result<V>
    where
        F: FnOnce() -> V;

    /// The value for `id`, if one was created or set.
    fn get(&self, id: u32) -> Result<Option<V>>;

    /// Store `value` under `id`, replacing any existing value. The store owns
    /// `value` and releases it on teardown. A replaced value is released on
    /// teardown too, not immediately.
    fn set(&self, id: u32, value: V) -> Result<()>;

    /// Like [`set`](Self::set), but the value is owned elsewhere and is never
    /// released by this store.
    fn set_external(&self, id: u32, value: V) -> Result<()>;

    /// Release every owned value in reverse creation order and switch the
    /// store to the disposed state. Release failures are logged and skipped.
    /// Calling it again does nothing.
    ///
    /// Must not be called from inside a factory of the same store.
    fn dispose_all(&self);

    /// `true` once [`dispose_all`](Self::dispose_all) has started.
    fn is_disposed(&self) -> bool;
}

// =============================================================================
// Slots and lifecycle
// =============================================================================

pub(crate) struct Entry<V> {
    id: u32,
    value: V,
    /// Owned values are released on teardown.
    owned: bool,
    /// Creation order, used to release in reverse.
    seq: u64,
}

/// One memoization cell. Reads are lock-free; writes happen under the
/// owning store's lock for this id.
pub(crate) struct Slot<V> {
    entry: ArcSwapOption<Entry<V>>,
    /// Set while this slot's factory runs. Only the lock holder touches it.
    creating: AtomicBool,
}

/// Clears a slot's `creating` mark, even if the factory unwinds.
struct CreatingMark<'a>(&'a AtomicBool);

impl Drop for CreatingMark<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Relaxed);
    }
}

impl<V> Slot<V> {
    pub(crate) fn new() -> Self {
        Self {
            entry: ArcSwapOption::empty(),
            creating: AtomicBool::new(false),
        }
    }

    pub(crate) fn peek(&self) -> Option<V>
    where
        V: Clone,
    {
        (*self.entry.load()).as_ref().map(|e| e.value.clone())
    }

    /// Empty the slot. Caller holds the id's lock.
    pub(crate) fn take(&self) -> Option<Arc<Entry<V>>> {
        self.entry.swap(None)
    }
}

/// Disposal state, creation order and retired values of one store.
pub(crate) struct Lifecycle<V> {
    disposed: AtomicBool,
    next_seq: AtomicU64,
    /// Owned values displaced by `set`, kept until teardown.
    retired: Mutex<Vec<Arc<Entry<V>>>>,
}

impl<V: Clone + Release> Lifecycle<V> {
    pub(crate) fn new() -> Self {
        Self {
            disposed: AtomicBool::new(false),
            next_seq: AtomicU64::new(0),
            retired: Mutex::new(Vec::new()),
        }
    }

    #[inline]
    pub(crate) fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    #[inline]
    pub(crate) fn ensure_active(&self) -> Result<()> {
        if self.is_disposed() {
            Err(Error::Disposed)
        } else {
            Ok(())
        }
    }

    /// Second half of the double-checked create. Caller holds the id's lock,
    /// which is reentrant, so a factory asking for its own id lands here again
    /// on the same thread.
    pub(crate) fn create_locked<F>(&self, id: u32, slot: &Slot<V>, factory: F) -> Result<V>
    where
        F: FnOnce() -> V,
    {
        if let Some(value) = slot.peek() {
            return Ok(value);
        }
        if slot.creating.swap(true, Ordering::Relaxed) {
            warn!(id, "factory re-entered its own id");
            return Err(Error::Recursive { id });
        }
        let value = {
            let _mark = CreatingMark(&slot.creating);
            factory()
        };
        // Pairs with the fence in `begin_dispose`: either teardown sees this
        // slot, or this thread sees the disposed flag.
        fence(Ordering::SeqCst);
        if self.is_disposed() {
            release_one(id, &value);
            return Err(Error::Disposed);
        }
        // The factory may have `set` this id itself; that value stands.
        if let Some(existing) = slot.peek() {
            release_one(id, &value);
            return Ok(existing);
        }
        trace!(id, "created scope value");
        slot.entry.store(Some(Arc::new(self.entry(id, value.clone(), true))));
        Ok(value)
    }

    /// Replace the value in `slot`. Caller holds the id's lock.
    pub(crate) fn store_locked(&self, id: u32, slot: &Slot<V>, value: V, owned: bool) -> Result<()> {
        fence(Ordering::SeqCst);
        if self.is_disposed() {
            if owned {
                release_one(id, &value);
            }
            return Err(Error::Disposed);
        }
        let previous = slot.entry.swap(Some(Arc::new(self.entry(id, value, owned))));
        if let Some(previous) = previous.filter(|e| e.owned) {
            self.retired.lock().push(previous);
        }
        Ok(())
    }

    /// Flip to disposed. Returns `false` if teardown already happened.
    pub(crate) fn begin_dispose(&self) -> bool {
        let first = !self.disposed.swap(true, Ordering::SeqCst);
        fence(Ordering::SeqCst);
        first
    }

    /// Release `drained` plus retired values, newest first.
    pub(crate) fn finish_dispose(&self, mut drained: Vec<Arc<Entry<V>>>) {
        drained.append(&mut self.retired.lock());
        drained.retain(|e| e.owned);
        drained.sort_unstable_by(|a, b| b.seq.cmp(&a.seq));

        debug!(count = drained.len(), "disposing scope values");
        let failed = drained
            .iter()
            .filter(|e| !release_one(e.id, &e.value))
            .count();
        debug!(failed, "scope disposed");
    }

    fn entry(&self, id: u32, value: V, owned: bool) -> Entry<V> {
        Entry {
            id,
            value,
            owned,
            seq: self.next_seq.fetch_add(1, Ordering::Relaxed),
        }
    }
}

/// Run one release hook, containing both errors and panics.
fn release_one<V: Release>(id: u32, value: &V) -> bool {
    match catch_unwind(AssertUnwindSafe(|| value.release())) {
        Ok(Ok(())) => true,
        Ok(Err(err)) => {
            warn!(id, error = %err, "release failed");
            false
        }
        Err(_) => {
            warn!(id, "release panicked");
            false
        }
    }
}
