//! Write-through composition.

use crate::{Cache, CacheError};
use async_trait::async_trait;
use futures::future::BoxFuture;
use std::sync::Arc;
use std::time::Duration;

/// Persists a key/value pair into the backing store.
pub type Storer<V> =
    Arc<dyn Fn(String, V) -> BoxFuture<'static, Result<(), CacheError>> + Send + Sync>;

/// Writes the backing store first, then the cache. If the store write
/// fails the cache is left untouched.
pub struct WriteThroughCache<C, V> {
    inner: C,
    store: Storer<V>,
}

impl<C, V> WriteThroughCache<C, V>
where
    C: Cache<V>,
    V: Clone + Send + Sync + 'static,
{
    pub fn new(inner: C, store: Storer<V>) -> Self {
        Self { inner, store }
    }
}

#[async_trait]
impl<C, V> Cache<V> for WriteThroughCache<C, V>
where
    C: Cache<V>,
    V: Clone + Send + Sync + 'static,
{
    async fn set(&self, key: &str, val: V, ttl: Duration) -> Result<(), CacheError> {
        (self.store)(key.to_string(), val.clone()).await?;
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
