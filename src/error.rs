//! Error type shared by the publish cell and the scope stores.

/// Errors surfaced by [`SwapCell`](crate::SwapCell) and the scope stores.
///
/// Lookups never fail with an error: absence is reported as `None`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// A `swap_with` transform lost the compare-and-set race too many times.
    ///
    /// This points at pathological contention or a transform that never
    /// settles. The cell is left holding whatever the winners published.
    #[error("snapshot swap gave up after {attempts} attempts under contention")]
    Contention {
        /// Number of transforms computed before giving up.
        attempts: usize,
    },

    /// The store was torn down by `dispose_all` and refuses further use.
    #[error("store disposed")]
    Disposed,

    /// A factory asked for the id it is currently creating.
    #[error("recursive creation of scope value {id}")]
    Recursive {
        /// The id whose factory re-entered itself.
        id: u32,
    },
}

/// Result type for cell and store operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error returned by a value's [`Release`](crate::Release) hook.
pub type ReleaseError = Box<dyn std::error::Error + Send + Sync>;
