//! Single-node distributed lock over Redis.
//!
//! Every server-side transition is a single atomic step: acquisition is
//! `SET NX EX` (or a set-or-extend script for retried acquisition), and
//! unlock/refresh are compare-token scripts, so no other client can
//! interleave between the comparison and the mutation.

use crate::retry::RetryStrategy;
use crate::CacheError;
use redis::aio::ConnectionManager;
use redis::Script;
use std::time::Duration;
use tokio::sync::watch;
use uuid::Uuid;

/// Deletes the key only while the caller still holds it.
const LUA_UNLOCK: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
else
    return 0
end
"#;

/// Re-arms the TTL only while the caller still holds the key.
const LUA_REFRESH: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("EXPIRE", KEYS[1], ARGV[2])
else
    return 0
end
"#;

/// Takes the key if it is free, or extends it if this caller already holds
/// it, so a crash-and-retry by the same logical caller is idempotent.
const LUA_LOCK: &str = r#"
local val = redis.call("GET", KEYS[1])
if val == false then
    redis.call("SET", KEYS[1], ARGV[1], "EX", ARGV[2])
    return "OK"
elseif val == ARGV[1] then
    redis.call("EXPIRE", KEYS[1], ARGV[2])
    return "OK"
else
    return ""
end
"#;

/// Hands out [`Lock`]s backed by a Redis server.
#[derive(Clone)]
pub struct LockClient {
    conn: ConnectionManager,
}

impl LockClient {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }

    /// Connects to `url` and wraps the managed connection.
    pub async fn connect(url: &str) -> Result<Self, CacheError> {
        let client = redis::Client::open(url).map_err(CacheError::Redis)?;
        let conn = client
            .get_connection_manager()
            .await
            .map_err(CacheError::Redis)?;
        Ok(Self::new(conn))
    }

    /// One-shot acquisition: set-if-absent with a fresh token. A key held
    /// by anyone (including a previous incarnation of this caller) fails
    /// with [`CacheError::FailedToPreempt`].
    pub async fn try_lock(&self, key: &str, ttl: Duration) -> Result<Lock, CacheError> {
        let token = Uuid::new_v4().to_string();
        let mut conn = self.conn.clone();
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(&token)
            .arg("EX")
            .arg(ttl_secs(ttl))
            .arg("NX")
            .query_async(&mut conn)
            .await
            .map_err(CacheError::Redis)?;
        match reply {
            Some(_) => Ok(Lock::new(self.conn.clone(), key, token, ttl)),
            None => Err(CacheError::FailedToPreempt),
        }
    }

    /// Acquisition with retries. Each attempt runs the set-or-extend
    /// script under `attempt_timeout`; failed attempts sleep per the
    /// strategy, and an exhausted strategy yields
    /// [`CacheError::FailedToPreempt`] (or [`CacheError::Timeout`] when
    /// the last attempt timed out rather than losing the race).
    pub async fn lock(
        &self,
        key: &str,
        ttl: Duration,
        attempt_timeout: Duration,
        mut retry: impl RetryStrategy,
    ) -> Result<Lock, CacheError> {
        let token = Uuid::new_v4().to_string();
        let script = Script::new(LUA_LOCK);
        let mut timed_out = false;
        loop {
            let mut conn = self.conn.clone();
            let mut invocation = script.prepare_invoke();
            invocation.key(key).arg(&token).arg(ttl_secs(ttl));
            let attempt = invocation.invoke_async::<_, String>(&mut conn);
            match tokio::time::timeout(attempt_timeout, attempt).await {
                Ok(Ok(reply)) if reply == "OK" => {
                    return Ok(Lock::new(self.conn.clone(), key, token, ttl));
                }
                Ok(Ok(_)) => {
                    timed_out = false;
                }
                Ok(Err(err)) => return Err(CacheError::Redis(err)),
                Err(_) => {
                    tracing::debug!(key, "lock attempt timed out");
                    timed_out = true;
                }
            }
            match retry.next() {
                Some(delay) => tokio::time::sleep(delay).await,
                None if timed_out => return Err(CacheError::Timeout),
                None => return Err(CacheError::FailedToPreempt),
            }
        }
    }
}

/// A held lock: key, the token minted at acquisition, and the TTL that
/// refreshes re-arm.
///
/// Clones share the same token and shutdown signal, so one clone can run
/// [`Lock::auto_refresh`] in a background task while another unlocks.
#[derive(Clone)]
pub struct Lock {
    conn: ConnectionManager,
    key: String,
    token: String,
    ttl: Duration,
    unlocked: watch::Sender<bool>,
}

impl std::fmt::Debug for Lock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lock")
            .field("key", &self.key)
            .field("token", &self.token)
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl Lock {
    fn new(conn: ConnectionManager, key: &str, token: String, ttl: Duration) -> Self {
        let (unlocked, _) = watch::channel(false);
        Self {
            conn,
            key: key.to_string(),
            token,
            ttl,
            unlocked,
        }
    }

    /// Releases the lock if this instance still holds it; otherwise
    /// reports [`CacheError::NotHolder`]. Whatever the outcome, the
    /// auto-refresh loop (if running) is told to stop.
    pub async fn unlock(&self) -> Result<(), CacheError> {
        let result = self.eval_i64(LUA_UNLOCK, None).await;
        // send_replace stores the flag even with no subscriber yet, so an
        // auto-refresh started after the unlock still sees it.
        self.unlocked.send_replace(true);
        match result? {
            1 => Ok(()),
            _ => Err(CacheError::NotHolder),
        }
    }

    /// Re-arms the TTL if this instance still holds the lock.
    pub async fn refresh(&self) -> Result<(), CacheError> {
        match self.eval_i64(LUA_REFRESH, Some(ttl_secs(self.ttl))).await? {
            1 => Ok(()),
            _ => Err(CacheError::NotHolder),
        }
    }

    /// Refreshes the lock every `interval`. A refresh that exceeds
    /// `timeout` is retried immediately; any other error ends the loop
    /// with that error. Returns `Ok(())` once [`Lock::unlock`] has run.
    pub async fn auto_refresh(
        &self,
        interval: Duration,
        timeout: Duration,
    ) -> Result<(), CacheError> {
        let mut unlocked = self.unlocked.subscribe();
        if *unlocked.borrow() {
            return Ok(());
        }
        let start = tokio::time::Instant::now();
        let mut ticker = tokio::time::interval_at(start + interval, interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => loop {
                    match tokio::time::timeout(timeout, self.refresh()).await {
                        Err(_) => {
                            tracing::debug!(key = %self.key, "lock refresh timed out; retrying");
                        }
                        Ok(Err(err)) => return Err(err),
                        Ok(Ok(())) => break,
                    }
                },
                _ = unlocked.changed() => return Ok(()),
            }
        }
    }

    async fn eval_i64(&self, lua: &str, ttl_arg: Option<u64>) -> Result<i64, CacheError> {
        let mut conn = self.conn.clone();
        let script = Script::new(lua);
        let mut invocation = script.prepare_invoke();
        invocation.key(&self.key).arg(&self.token);
        if let Some(secs) = ttl_arg {
            invocation.arg(secs);
        }
        invocation
            .invoke_async(&mut conn)
            .await
            .map_err(CacheError::Redis)
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

fn ttl_secs(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}
