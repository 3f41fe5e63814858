//! Read-through variant gated by a Bloom filter.

use crate::read_through::{Loader, ReadThroughCache};
use crate::{Cache, CacheError};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Approximate membership test for keys that may exist in the source.
pub trait BloomFilter: Send + Sync {
    /// False means the key definitely is not in the source.
    fn might_contain(&self, key: &str) -> bool;
}

/// A [`ReadThroughCache`] whose loader is short-circuited by a filter:
/// keys the filter has never seen report [`CacheError::KeyNotFound`]
/// without touching the backing source. This blunts penetration by
/// lookups for keys that cannot exist.
pub struct BloomFilterCache<C, V> {
    inner: ReadThroughCache<C, V>,
}

impl<C, V> BloomFilterCache<C, V>
where
    C: Cache<V>,
    V: Clone + Send + Sync + 'static,
{
    pub fn new(cache: C, filter: Arc<dyn BloomFilter>, loader: Loader<V>, ttl: Duration) -> Self {
        let gated: Loader<V> = Arc::new(move |key: String| {
            if !filter.might_contain(&key) {
                return Box::pin(async move { Err(CacheError::KeyNotFound(key)) });
            }
            loader(key)
        });
        Self {
            inner: ReadThroughCache::new(cache, gated, ttl),
        }
    }
}

#[async_trait]
impl<C, V> Cache<V> for BloomFilterCache<C, V>
where
    C: Cache<V>,
    V: Clone + Send + Sync + 'static,
{
    async fn set(&self, key: &str, val: V, ttl: Duration) -> Result<(), CacheError> {
        self.inner.set(key, val, ttl).await
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LocalCache;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct SetFilter(HashSet<String>);

    impl BloomFilter for SetFilter {
        fn might_contain(&self, key: &str) -> bool {
            self.0.contains(key)
        }
    }

    #[tokio::test]
    async fn unknown_keys_never_reach_the_loader() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counted = Arc::clone(&calls);
        let loader: Loader<String> = Arc::new(move |key: String| {
            counted.fetch_add(1, Ordering::SeqCst);
            Box::pin(async move { Ok(format!("loaded:{key}")) })
        });
        let filter = Arc::new(SetFilter(HashSet::from(["known".to_string()])));
        let cache = BloomFilterCache::new(
            LocalCache::builder().build(),
            filter,
            loader,
            Duration::from_secs(60),
        );

        let err = cache.get("unknown").await.unwrap_err();
        assert!(err.is_not_found(), "got {err}");
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        assert_eq!(cache.get("known").await.unwrap(), "loaded:known");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
