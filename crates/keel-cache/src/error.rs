//! Error types shared by the cache wrappers and the distributed lock.

use std::sync::Arc;
use thiserror::Error;

/// Errors surfaced by the caches and the lock client.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The key is not present, or its entry had expired.
    #[error("cache: key not found: {0}")]
    KeyNotFound(String),

    /// A bounded cache refused to store a new key at capacity.
    #[error("cache: over capacity")]
    OverCapacity,

    /// A loader failed to produce a value for `key`.
    #[error("cache: load failed for key {key}: {message}")]
    LoadFailed { key: String, message: String },

    /// The value was loaded, but writing it back into the cache failed.
    /// The loaded value accompanies this error on the read-through path.
    #[error("cache: failed to refresh cache for key {key}")]
    RefreshFailed {
        key: String,
        #[source]
        source: Box<CacheError>,
    },

    /// A coalesced miss observed the failure of the load it was sharing,
    /// and that error could not be rebuilt per-caller.
    #[error("cache: shared load failed")]
    Coalesced(#[source] Arc<CacheError>),

    /// The in-flight load this caller was waiting on went away without a
    /// result.
    #[error("cache: shared load was interrupted")]
    FlightInterrupted,

    /// Another holder owns the lock.
    #[error("lock: failed to preempt lock")]
    FailedToPreempt,

    /// The server-side token no longer matches: the lock is held by someone
    /// else or not at all.
    #[error("lock: lock not held")]
    NotHolder,

    /// A lock attempt timed out.
    #[error("lock: operation timed out")]
    Timeout,

    /// The Redis backend reported an error.
    #[error(transparent)]
    Redis(#[from] redis::RedisError),
}

impl CacheError {
    pub(crate) fn not_found(key: &str) -> Self {
        CacheError::KeyNotFound(key.to_string())
    }

    /// Whether this error means the key was absent (or expired).
    pub fn is_not_found(&self) -> bool {
        matches!(self, CacheError::KeyNotFound(_))
    }
}
