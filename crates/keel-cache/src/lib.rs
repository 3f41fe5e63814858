//! Concurrent in-process caching primitives and a Redis-backed distributed lock.
//!
//! The building block is [`LocalCache`], a TTL map with lazy expiration on
//! reads and a background sweeper that reclaims expired entries in bounded,
//! randomized batches. Everything else composes around the [`Cache`] trait:
//!
//! - **Capacity**: [`BoundedCache`] rejects inserts of new keys past a
//!   maximum entry count.
//! - **Stampede mitigation**: [`JitteredCache`] spreads deadlines with a
//!   random TTL offset; [`ReadThroughCache`] coalesces concurrent misses so
//!   a given key is loaded at most once at a time.
//! - **Backing stores**: [`ReadThroughCache`] fills misses from a loader,
//!   [`WriteThroughCache`] writes the store before the cache, and
//!   [`BloomFilterCache`] skips the loader for keys a filter has never seen.
//! - **Coordination**: [`LockClient`] speaks to a Redis server and hands out
//!   single-holder [`Lock`]s with refresh and auto-refresh support.
//!
//! # Examples
//!
//! ```
//! use keel_cache::{Cache, LocalCache};
//! use std::time::Duration;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), keel_cache::CacheError> {
//! let cache: LocalCache<String> = LocalCache::builder()
//!     .sweep_interval(Duration::from_secs(1))
//!     .build();
//!
//! cache.set("greeting", "hello".to_string(), Duration::from_secs(60)).await?;
//! assert_eq!(cache.get("greeting").await?, "hello");
//! # Ok(())
//! # }
//! ```

mod bloom;
mod bounded;
mod error;
mod jitter;
mod local;
mod lock;
mod read_through;
mod retry;
mod write_through;

pub use bloom::{BloomFilter, BloomFilterCache};
pub use bounded::BoundedCache;
pub use error::CacheError;
pub use jitter::JitteredCache;
pub use local::{LocalCache, LocalCacheBuilder};
pub use lock::{Lock, LockClient};
pub use read_through::{Loader, ReadThroughCache};
pub use retry::{FixedIntervalRetry, RetryStrategy};
pub use write_through::{Storer, WriteThroughCache};

use async_trait::async_trait;
use std::time::Duration;

/// The shared cache contract.
///
/// A `ttl` of zero means the entry never expires; any other value sets an
/// absolute deadline of now + `ttl`. Readers cannot distinguish "never
/// stored" from "expired": both surface as [`CacheError::KeyNotFound`].
#[async_trait]
pub trait Cache<V>: Send + Sync
where
    V: Clone + Send + Sync + 'static,
{
    /// Stores `val` under `key`, replacing any previous entry.
    async fn set(&self, key: &str, val: V, ttl: Duration) -> Result<(), CacheError>;

    /// Returns the live value for `key`.
    async fn get(&self, key: &str) -> Result<V, CacheError>;

    /// Removes `key`. Removing an absent key is not an error.
    async fn delete(&self, key: &str) -> Result<(), CacheError>;

    /// Removes `key` and returns the value it held.
    async fn load_and_delete(&self, key: &str) -> Result<V, CacheError>;
}
