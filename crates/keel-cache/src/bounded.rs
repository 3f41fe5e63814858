//! Entry-count bound over [`LocalCache`].

use crate::{Cache, CacheError, LocalCache, LocalCacheBuilder};
use async_trait::async_trait;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Caps the number of live entries in a [`LocalCache`].
///
/// Inserting a *new* key when the cache is full fails with
/// [`CacheError::OverCapacity`]; replacing an existing key never changes
/// the count. The counter is maintained by the eviction callback, so
/// entries reclaimed by the sweeper or by lazy expiry free capacity too.
pub struct BoundedCache<V> {
    inner: LocalCache<V>,
    count: Arc<AtomicI64>,
    max_entries: i64,
}

impl<V> BoundedCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Builds the underlying cache with the counting callback chained in
    /// front of whatever the builder already carries.
    pub fn new(builder: LocalCacheBuilder<V>, max_entries: i64) -> Self {
        let count = Arc::new(AtomicI64::new(0));
        let counter = Arc::clone(&count);
        let inner = builder
            .chain_evicted(move |_, _| {
                counter.fetch_sub(1, Ordering::SeqCst);
            })
            .build();
        Self {
            inner,
            count,
            max_entries,
        }
    }

    /// Number of live entries.
    pub fn len(&self) -> i64 {
        self.count.load(Ordering::SeqCst)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stops the underlying sweeper.
    pub fn close(&self) {
        self.inner.close();
    }
}

#[async_trait]
impl<V> Cache<V> for BoundedCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    async fn set(&self, key: &str, val: V, ttl: Duration) -> Result<(), CacheError> {
        // The presence check and the insert run under one table lock, so
        // two concurrent inserts of distinct keys cannot both slip past a
        // full cache.
        self.inner.set_checked(key, val, ttl, |exists| {
            if !exists {
                if self.count.load(Ordering::SeqCst) + 1 > self.max_entries {
                    return Err(CacheError::OverCapacity);
                }
                self.count.fetch_add(1, Ordering::SeqCst);
            }
            Ok(())
        })
    }

    async fn get(&self, key: &str) -> Result<V, CacheError> {
        self.inner.get(key).await
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.inner.delete(key).await
    }

    async fn load_and_delete(&self, key: &str) -> Result<V, CacheError> {
        self.inner.load_and_delete(key).await
    }
}
