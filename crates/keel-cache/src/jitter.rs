//! Randomized TTL offsets against cache stampedes.

use crate::{Cache, CacheError};
use async_trait::async_trait;
use rand::Rng;
use std::time::Duration;

const DEFAULT_MAX_OFFSET: Duration = Duration::from_secs(300);

/// Spreads expiry deadlines so a burst of inserts does not expire at the
/// same instant and stampede whatever sits behind the cache.
///
/// Every `set` with a non-zero TTL gets a uniform random offset in
/// `[0, max_offset)` added before delegating; a zero TTL (never expires)
/// passes through untouched.
pub struct JitteredCache<C> {
    inner: C,
    max_offset: Duration,
}

impl<C> JitteredCache<C> {
    /// Wraps `inner` with the default 300 second maximum offset.
    pub fn new(inner: C) -> Self {
        Self::with_max_offset(inner, DEFAULT_MAX_OFFSET)
    }

    pub fn with_max_offset(inner: C, max_offset: Duration) -> Self {
        Self { inner, max_offset }
    }

    fn jittered(&self, ttl: Duration) -> Duration {
        let span = self.max_offset.as_secs();
        if ttl.is_zero() || span == 0 {
            return ttl;
        }
        let offset = rand::thread_rng().gen_range(0..span);
        ttl + Duration::from_secs(offset)
    }
}

#[async_trait]
impl<V, C> Cache<V> for JitteredCache<C>
where
    V: Clone + Send + Sync + 'static,
    C: Cache<V>,
{
    async fn set(&self, key: &str, val: V, ttl: Duration) -> Result<(), CacheError> {
        self.inner.set(key, val, self.jittered(ttl)).await
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

    #[tokio::test(start_paused = true)]
    async fn zero_ttl_is_untouched() {
        let cache = JitteredCache::new(LocalCache::builder().build());
        cache.set("a", 1, Duration::ZERO).await.unwrap();
        tokio::time::sleep(Duration::from_secs(3600)).await;
        assert_eq!(cache.get("a").await.unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn offset_only_extends_the_deadline() {
        let cache = JitteredCache::new(LocalCache::builder().build());
        cache.set("a", 1, Duration::from_secs(60)).await.unwrap();
        // Whatever offset was drawn, the entry must outlive its base TTL.
        tokio::time::sleep(Duration::from_secs(59)).await;
        assert_eq!(cache.get("a").await.unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_stays_below_ttl_plus_max_offset() {
        let inner: LocalCache<i64> = LocalCache::builder().build();
        let cache = JitteredCache::with_max_offset(inner, Duration::from_secs(5));
        cache.set("a", 1, Duration::from_secs(10)).await.unwrap();
        tokio::time::sleep(Duration::from_secs(16)).await;
        assert!(cache.get("a").await.unwrap_err().is_not_found());
    }
}
