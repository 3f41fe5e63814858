//! The in-process TTL map.

use crate::{Cache, CacheError};
use async_trait::async_trait;
use parking_lot::RwLock;
use rand::seq::IteratorRandom;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

/// Invoked with the key and value of every entry removed from the table,
/// whatever the removal path (delete, lazy expiry, sweep).
pub(crate) type EvictionCallback<V> = Arc<dyn Fn(&str, &V) + Send + Sync>;

struct Entry<V> {
    val: V,
    deadline: Option<Instant>,
}

impl<V> Entry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        matches!(self.deadline, Some(deadline) if deadline <= now)
    }
}

pub(crate) struct Shared<V> {
    table: RwLock<HashMap<String, Entry<V>>>,
    on_evicted: Option<EvictionCallback<V>>,
}

impl<V> Shared<V> {
    fn store(&self, table: &mut HashMap<String, Entry<V>>, key: &str, val: V, ttl: Duration) {
        let deadline = if ttl.is_zero() {
            None
        } else {
            Some(Instant::now() + ttl)
        };
        table.insert(key.to_string(), Entry { val, deadline });
    }

    /// Removes `key` and fires the eviction callback exactly once.
    fn remove(&self, table: &mut HashMap<String, Entry<V>>, key: &str) -> Option<Entry<V>> {
        let entry = table.remove(key)?;
        if let Some(on_evicted) = &self.on_evicted {
            on_evicted(key, &entry.val);
        }
        Some(entry)
    }

    /// One sweeper tick: examine at most `limit` entries in randomized
    /// order and drop the expired ones. The write lock is held for the
    /// whole tick, so sweeping and user operations never interleave.
    fn sweep(&self, limit: usize) {
        let mut table = self.table.write();
        let now = Instant::now();
        let expired: Vec<String> = if table.len() <= limit {
            table
                .iter()
                .filter(|(_, entry)| entry.is_expired(now))
                .map(|(key, _)| key.clone())
                .collect()
        } else {
            let mut rng = rand::thread_rng();
            table
                .iter()
                .choose_multiple(&mut rng, limit)
                .into_iter()
                .filter(|(_, entry)| entry.is_expired(now))
                .map(|(key, _)| key.clone())
                .collect()
        };
        if !expired.is_empty() {
            tracing::debug!(count = expired.len(), "sweeping expired cache entries");
        }
        for key in expired {
            self.remove(&mut table, &key);
        }
    }
}

/// Builder for [`LocalCache`].
pub struct LocalCacheBuilder<V> {
    sweep_interval: Duration,
    sweep_limit: usize,
    on_evicted: Option<EvictionCallback<V>>,
}

impl<V> LocalCacheBuilder<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn new() -> Self {
        Self {
            sweep_interval: Duration::from_secs(1),
            sweep_limit: 1000,
            on_evicted: None,
        }
    }

    /// How often the background sweeper wakes up. Defaults to one second.
    pub fn sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    /// How many entries a single sweeper tick may examine. Defaults to 1000.
    pub fn sweep_limit(mut self, limit: usize) -> Self {
        self.sweep_limit = limit;
        self
    }

    /// Registers a callback fired once per removed entry.
    pub fn on_evicted(mut self, f: impl Fn(&str, &V) + Send + Sync + 'static) -> Self {
        self.on_evicted = Some(Arc::new(f));
        self
    }

    /// Chains `f` in front of any previously registered callback.
    pub(crate) fn chain_evicted(mut self, f: impl Fn(&str, &V) + Send + Sync + 'static) -> Self {
        let previous = self.on_evicted.take();
        self.on_evicted = Some(Arc::new(move |key: &str, val: &V| {
            f(key, val);
            if let Some(previous) = &previous {
                previous(key, val);
            }
        }));
        self
    }

    /// Builds the cache and starts its sweeper task.
    pub fn build(self) -> LocalCache<V> {
        let shared = Arc::new(Shared {
            table: RwLock::new(HashMap::new()),
            on_evicted: self.on_evicted,
        });
        let (shutdown, mut stopped) = watch::channel(false);
        let sweeper = Arc::clone(&shared);
        let interval = self.sweep_interval;
        let limit = self.sweep_limit;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => sweeper.sweep(limit),
                    _ = stopped.changed() => return,
                }
            }
        });
        LocalCache { shared, shutdown }
    }
}

/// A concurrent TTL map.
///
/// Expired entries are dropped lazily when a read trips over them and in
/// the background by a sweeper that scans a bounded, randomized sample of
/// the table per tick, so repeated ticks probabilistically cover the whole
/// key space. The sweeper stops on [`LocalCache::close`] or when the cache
/// is dropped.
pub struct LocalCache<V> {
    shared: Arc<Shared<V>>,
    shutdown: watch::Sender<bool>,
}

impl<V> LocalCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub fn builder() -> LocalCacheBuilder<V> {
        LocalCacheBuilder::new()
    }

    /// Stops the background sweeper. Idempotent; entries remain readable.
    pub fn close(&self) {
        let _ = self.shutdown.send(true);
    }

    /// Stores under the table lock after `check` approves the write.
    /// `check` receives whether the key is currently present.
    pub(crate) fn set_checked(
        &self,
        key: &str,
        val: V,
        ttl: Duration,
        check: impl FnOnce(bool) -> Result<(), CacheError>,
    ) -> Result<(), CacheError> {
        let mut table = self.shared.table.write();
        check(table.contains_key(key))?;
        self.shared.store(&mut table, key, val, ttl);
        Ok(())
    }
}

impl<V> Drop for LocalCache<V> {
    fn drop(&mut self) {
        let _ = self.shutdown.send(true);
    }
}

#[async_trait]
impl<V> Cache<V> for LocalCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    async fn set(&self, key: &str, val: V, ttl: Duration) -> Result<(), CacheError> {
        let mut table = self.shared.table.write();
        self.shared.store(&mut table, key, val, ttl);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<V, CacheError> {
        let now = Instant::now();
        {
            let table = self.shared.table.read();
            match table.get(key) {
                None => return Err(CacheError::not_found(key)),
                Some(entry) if !entry.is_expired(now) => return Ok(entry.val.clone()),
                Some(_) => {}
            }
        }

        // The entry looked expired under the read lock; re-check under the
        // write lock before dropping it, since a writer may have replaced
        // it in between.
        let mut table = self.shared.table.write();
        match table.get(key) {
            None => Err(CacheError::not_found(key)),
            Some(entry) if entry.is_expired(now) => {
                self.shared.remove(&mut table, key);
                Err(CacheError::not_found(key))
            }
            Some(entry) => Ok(entry.val.clone()),
        }
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        let mut table = self.shared.table.write();
        self.shared.remove(&mut table, key);
        Ok(())
    }

    async fn load_and_delete(&self, key: &str) -> Result<V, CacheError> {
        let mut table = self.shared.table.write();
        match self.shared.remove(&mut table, key) {
            Some(entry) => Ok(entry.val),
            None => Err(CacheError::not_found(key)),
        }
    }
}
