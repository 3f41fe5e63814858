//! Read-through composition with coalesced misses.

use crate::{Cache, CacheError};
use async_trait::async_trait;
use futures::future::BoxFuture;
use hashbrown::HashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

/// Produces the value for a missing key from the backing source.
pub type Loader<V> =
    Arc<dyn Fn(String) -> BoxFuture<'static, Result<V, CacheError>> + Send + Sync>;

type FlightResult<V> = Result<V, Arc<CacheError>>;

/// Fills cache misses from a loader and writes the result back.
///
/// Concurrent misses for the same key are coalesced: one caller (the
/// leader) runs the loader while the rest subscribe to its result, so at
/// most one load per key is in flight at any time. A failed writeback
/// surfaces as [`CacheError::RefreshFailed`] to the leader, but the loaded
/// value has already been handed to every waiter.
pub struct ReadThroughCache<C, V> {
    inner: C,
    loader: Loader<V>,
    ttl: Duration,
    flights: Mutex<HashMap<String, broadcast::Sender<FlightResult<V>>>>,
}

impl<C, V> ReadThroughCache<C, V>
where
    C: Cache<V>,
    V: Clone + Send + Sync + 'static,
{
    /// `ttl` is applied to every value written back after a load.
    pub fn new(inner: C, loader: Loader<V>, ttl: Duration) -> Self {
        Self {
            inner,
            loader,
            ttl,
            flights: Mutex::new(HashMap::new()),
        }
    }

    /// Either subscribes to an in-flight load for `key` or claims
    /// leadership of a new one.
    fn join_flight(&self, key: &str) -> Result<FlightGuard<'_, V>, broadcast::Receiver<FlightResult<V>>> {
        let mut flights = self.flights.lock();
        if let Some(sender) = flights.get(key) {
            return Err(sender.subscribe());
        }
        let (sender, _) = broadcast::channel(1);
        flights.insert(key.to_string(), sender);
        Ok(FlightGuard {
            flights: &self.flights,
            key: key.to_string(),
            outcome: None,
        })
    }

    async fn load(&self, key: &str) -> Result<V, CacheError> {
        let mut guard = match self.join_flight(key) {
            Err(mut receiver) => {
                return match receiver.recv().await {
                    Ok(Ok(val)) => Ok(val),
                    Ok(Err(shared)) => Err(unshare(shared)),
                    Err(_) => Err(CacheError::FlightInterrupted),
                };
            }
            Ok(guard) => guard,
        };

        match (self.loader)(key.to_string()).await {
            Ok(val) => {
                // Followers get the value whether or not the writeback
                // sticks; only the leader reports the refresh failure.
                guard.finish(Ok(val.clone()));
                if let Err(source) = self.inner.set(key, val.clone(), self.ttl).await {
                    tracing::warn!(key, error = %source, "cache writeback failed after load");
                    return Err(CacheError::RefreshFailed {
                        key: key.to_string(),
                        source: Box::new(source),
                    });
                }
                Ok(val)
            }
            Err(err) => {
                let shared = Arc::new(err);
                guard.finish(Err(Arc::clone(&shared)));
                // Publish now, so that with no followers listening the
                // broadcast clone is released and the leader reports the
                // loader's error exactly as produced.
                drop(guard);
                Err(unshare(shared))
            }
        }
    }
}

/// Recovers a loader error out of its shared wrapper. Sole ownership
/// (no contention) hands the error back untouched; otherwise clonable
/// variants are rebuilt and only what cannot be rebuilt is reported as
/// [`CacheError::Coalesced`].
fn unshare(shared: Arc<CacheError>) -> CacheError {
    match Arc::try_unwrap(shared) {
        Ok(err) => err,
        Err(shared) => {
            let rebuilt = match shared.as_ref() {
                CacheError::KeyNotFound(key) => Some(CacheError::KeyNotFound(key.clone())),
                CacheError::LoadFailed { key, message } => Some(CacheError::LoadFailed {
                    key: key.clone(),
                    message: message.clone(),
                }),
                CacheError::OverCapacity => Some(CacheError::OverCapacity),
                CacheError::FailedToPreempt => Some(CacheError::FailedToPreempt),
                CacheError::NotHolder => Some(CacheError::NotHolder),
                CacheError::Timeout => Some(CacheError::Timeout),
                CacheError::FlightInterrupted => Some(CacheError::FlightInterrupted),
                _ => None,
            };
            rebuilt.unwrap_or(CacheError::Coalesced(shared))
        }
    }
}

/// Removes the flight entry and publishes the outcome, also when the
/// leader is cancelled mid-load (waiters then observe a closed channel).
struct FlightGuard<'a, V> {
    flights: &'a Mutex<HashMap<String, broadcast::Sender<FlightResult<V>>>>,
    key: String,
    outcome: Option<FlightResult<V>>,
}

impl<V> FlightGuard<'_, V> {
    fn finish(&mut self, outcome: FlightResult<V>) {
        self.outcome = Some(outcome);
    }
}

impl<V> Drop for FlightGuard<'_, V> {
    fn drop(&mut self) {
        let sender = self.flights.lock().remove(&self.key);
        if let (Some(sender), Some(outcome)) = (sender, self.outcome.take()) {
            let _ = sender.send(outcome);
        }
    }
}

#[async_trait]
impl<C, V> Cache<V> for ReadThroughCache<C, V>
where
    C: Cache<V>,
    V: Clone + Send + Sync + 'static,
{
    async fn set(&self, key: &str, val: V, ttl: Duration) -> Result<(), CacheError> {
        self.inner.set(key, val, ttl).await
    }

    async fn get(&self, key: &str) -> Result<V, CacheError> {
        match self.inner.get(key).await {
            Ok(val) => Ok(val),
            Err(err) if err.is_not_found() => self.load(key).await,
            Err(err) => Err(err),
        }
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.inner.delete(key).await
    }

    async fn load_and_delete(&self, key: &str) -> Result<V, CacheError> {
        self.inner.load_and_delete(key).await
    }
}
