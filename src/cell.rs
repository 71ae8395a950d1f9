//! Lock-free publishing of immutable snapshots.
//!
//! A [`SwapCell`] holds one `Arc` to the current snapshot. Readers load it
//! without blocking. Writers compute a new snapshot from the current one and
//! publish it with compare-and-set; a writer that loses the race recomputes
//! against the winner's snapshot.

use std::fmt;
use std::sync::Arc;

use arc_swap::{ArcSwap, Guard};
use tracing::{error, trace};

use crate::error::{Error, Result};

/// Default cap on `swap_with` attempts before reporting contention.
pub const DEFAULT_SWAP_RETRIES: usize = 50;

/// Atomically replaceable reference to an immutable value.
///
/// # Example
///
/// ```rust
/// use snaptree::{IntTree, SwapCell};
///
/// let cell = SwapCell::new(IntTree::<&str>::new());
/// cell.swap_with(|t| t.add_or_update(1, "one")).unwrap();
/// assert_eq!(cell.load().get(&1), Some(&"one"));
/// ```
pub struct SwapCell<T> {
    current: ArcSwap<T>,
    max_retries: usize,
}

impl<T> SwapCell<T> {
    /// Create a cell with the default retry cap.
    pub fn new(initial: T) -> Self {
        Self::with_retries(initial, DEFAULT_SWAP_RETRIES)
    }

    /// Create a cell that gives up after `max_retries` lost races (at least 1).
    pub fn with_retries(initial: T, max_retries: usize) -> Self {
        Self {
            current: ArcSwap::from_pointee(initial),
            max_retries: max_retries.max(1),
        }
    }

    /// The current snapshot.
    #[inline]
    pub fn load(&self) -> Arc<T> {
        self.current.load_full()
    }

    /// Borrow the current snapshot without touching the reference count.
    ///
    /// Hold the guard briefly; long-lived readers should use [`load`](Self::load).
    #[inline]
    pub fn peek(&self) -> Guard<Arc<T>> {
        self.current.load()
    }

    /// Unconditionally publish `value`, returning the snapshot it replaced.
    pub fn swap(&self, value: T) -> Arc<T> {
        self.current.swap(Arc::new(value))
    }

    /// Publish `transform(current)`, returning the snapshot it replaced.
    ///
    /// `transform` runs once per attempt and must be free of side effects
    /// that cannot be repeated. Fails with [`Error::Contention`] after the
    /// retry cap.
    pub fn swap_with<F>(&self, transform: F) -> Result<Arc<T>>
    where
        F: FnMut(&T) -> T,
    {
        self.publish(transform).map(|(old, _)| old)
    }

    /// Like [`swap_with`](Self::swap_with), but returns the snapshot that was
    /// published.
    pub fn update<F>(&self, transform: F) -> Result<Arc<T>>
    where
        F: FnMut(&T) -> T,
    {
        self.publish(transform).map(|(_, new)| new)
    }

    /// Maximum number of transform attempts per swap.
    pub fn max_retries(&self) -> usize {
        self.max_retries
    }

    fn publish<F>(&self, mut transform: F) -> Result<(Arc<T>, Arc<T>)>
    where
        F: FnMut(&T) -> T,
    {
        let mut old = self.current.load_full();
        for attempt in 1..=self.max_retries {
            let new = Arc::new(transform(&old));
            let prev = self.current.compare_and_swap(&old, Arc::clone(&new));
            if Arc::ptr_eq(&*prev, &old) {
                return Ok((old, new));
            }
            trace!(attempt, "snapshot swap lost a race");
            old = Guard::into_inner(prev);
        }
        error!(
            attempts = self.max_retries,
            "snapshot swap exhausted its retries"
        );
        Err(Error::Contention {
            attempts: self.max_retries,
        })
    }
}

impl<T: Default> Default for SwapCell<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: fmt::Debug> fmt::Debug for SwapCell<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SwapCell")
            .field("current", &**self.current.load())
            .field("max_retries", &self.max_retries)
            .finish()
    }
}
