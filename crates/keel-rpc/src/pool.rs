//! Pooling of persistent connections.

use crate::RpcError;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Instant;

/// Builds a fresh connection.
pub type ConnFactory<C> =
    Arc<dyn Fn() -> BoxFuture<'static, Result<C, RpcError>> + Send + Sync>;

struct IdleConn<C> {
    conn: C,
    idle_since: Instant,
}

struct PoolState<C> {
    idle: VecDeque<IdleConn<C>>,
    /// Blocked getters, fulfilled oldest-first.
    waiters: VecDeque<oneshot::Sender<C>>,
    /// Connections currently in existence (idle or checked out).
    active: usize,
    closed: bool,
}

struct PoolInner<C> {
    state: Mutex<PoolState<C>>,
    factory: ConnFactory<C>,
    max_active: usize,
    max_idle: usize,
    max_idle_time: Duration,
}

/// A bounded pool of reusable connections. Clones share the pool.
///
/// `get` prefers a fresh-enough idle connection, then builds a new one
/// while under `max_active`, and otherwise queues behind earlier getters;
/// `put` hands a returned connection straight to the head of that queue.
/// The active count never exceeds `max_active`.
pub struct Pool<C> {
    inner: Arc<PoolInner<C>>,
}

impl<C> Clone for Pool<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C> Pool<C>
where
    C: Send + 'static,
{
    /// Creates the pool and eagerly fills it with `initial` connections.
    /// `initial` may not exceed `max_idle`.
    pub async fn new(
        initial: usize,
        max_idle: usize,
        max_active: usize,
        max_idle_time: Duration,
        factory: ConnFactory<C>,
    ) -> Result<Self, RpcError> {
        if initial > max_idle {
            return Err(RpcError::InvalidPoolConfig);
        }
        let mut idle = VecDeque::with_capacity(max_idle);
        for _ in 0..initial {
            idle.push_back(IdleConn {
                conn: factory().await?,
                idle_since: Instant::now(),
            });
        }
        let active = idle.len();
        Ok(Self {
            inner: Arc::new(PoolInner {
                state: Mutex::new(PoolState {
                    idle,
                    waiters: VecDeque::new(),
                    active,
                    closed: false,
                }),
                factory,
                max_active,
                max_idle,
                max_idle_time,
            }),
        })
    }

    /// Checks out a connection, waiting up to `timeout` behind a full
    /// pool. On timeout a background forwarder is left behind so that a
    /// late handoff flows back into the pool instead of leaking.
    pub async fn get(&self, timeout: Option<Duration>) -> Result<C, RpcError> {
        let waiter = {
            let mut state = self.inner.state.lock();
            if state.closed {
                return Err(RpcError::PoolClosed);
            }
            loop {
                match state.idle.pop_front() {
                    Some(idle) => {
                        if idle.idle_since.elapsed() > self.inner.max_idle_time {
                            // Too stale to trust; discard and keep looking.
                            state.active -= 1;
                            continue;
                        }
                        return Ok(idle.conn);
                    }
                    None => break,
                }
            }
            if state.active < self.inner.max_active {
                state.active += 1;
                None
            } else {
                let (tx, rx) = oneshot::channel();
                state.waiters.push_back(tx);
                Some(rx)
            }
        };

        match waiter {
            None => match (self.inner.factory)().await {
                Ok(conn) => Ok(conn),
                Err(err) => {
                    self.inner.state.lock().active -= 1;
                    Err(err)
                }
            },
            Some(mut rx) => {
                let deadline = timeout.map(|t| Instant::now() + t);
                let fulfilled = match deadline {
                    Some(deadline) => tokio::time::timeout_at(deadline, &mut rx).await,
                    None => Ok((&mut rx).await),
                };
                match fulfilled {
                    Ok(Ok(conn)) => Ok(conn),
                    Ok(Err(_)) => Err(RpcError::PoolClosed),
                    Err(_) => {
                        // Someone may still fulfil this waiter after we
                        // give up; forward that connection back into the
                        // pool rather than dropping it on the floor.
                        let pool = self.clone();
                        tokio::spawn(async move {
                            if let Ok(conn) = rx.await {
                                pool.put(conn);
                            }
                        });
                        Err(RpcError::Timeout)
                    }
                }
            }
        }
    }

    /// Returns a connection. Queued getters are served first, FIFO; with
    /// no queue the connection parks in the idle list, and past `max_idle`
    /// it is dropped and uncounted.
    pub fn put(&self, mut conn: C) {
        let mut state = self.inner.state.lock();
        while let Some(waiter) = state.waiters.pop_front() {
            match waiter.send(conn) {
                Ok(()) => return,
                // That getter is gone; try the next one.
                Err(returned) => conn = returned,
            }
        }
        if state.closed || state.idle.len() >= self.inner.max_idle {
            state.active -= 1;
            return;
        }
        state.idle.push_back(IdleConn {
            conn,
            idle_since: Instant::now(),
        });
    }

    /// Removes a checked-out connection from the pool's accounting, for
    /// callers that know it must not be reused (write failures, oneway
    /// frames with an unread response).
    pub fn discard(&self, conn: C) {
        drop(conn);
        self.inner.state.lock().active -= 1;
    }

    /// Drops all idle connections and fails queued getters. Idempotent.
    pub fn close(&self) {
        let mut state = self.inner.state.lock();
        if state.closed {
            return;
        }
        state.closed = true;
        let dropped = state.idle.len();
        state.active -= dropped;
        state.idle.clear();
        state.waiters.clear();
    }

    #[cfg(test)]
    fn active(&self) -> usize {
        self.inner.state.lock().active
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// A connection stand-in carrying its creation ordinal.
    #[derive(Debug, PartialEq)]
    struct FakeConn(usize);

    fn counting_factory(counter: Arc<AtomicUsize>) -> ConnFactory<FakeConn> {
        Arc::new(move || {
            let counter = Arc::clone(&counter);
            Box::pin(async move { Ok(FakeConn(counter.fetch_add(1, Ordering::SeqCst))) })
        })
    }

    #[tokio::test]
    async fn initial_larger_than_max_idle_is_rejected() {
        let made = Arc::new(AtomicUsize::new(0));
        let result = Pool::new(4, 2, 8, Duration::from_secs(60), counting_factory(made)).await;
        assert!(matches!(result, Err(RpcError::InvalidPoolConfig)));
    }

    #[tokio::test]
    async fn reuses_idle_connections() {
        let made = Arc::new(AtomicUsize::new(0));
        let pool = Pool::new(
            0,
            4,
            4,
            Duration::from_secs(60),
            counting_factory(Arc::clone(&made)),
        )
        .await
        .unwrap();

        let conn = pool.get(None).await.unwrap();
        pool.put(conn);
        let again = pool.get(None).await.unwrap();
        assert_eq!(again, FakeConn(0));
        assert_eq!(made.load(Ordering::SeqCst), 1);
        assert_eq!(pool.active(), 1);
        pool.put(again);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_idle_connections_are_discarded() {
        let made = Arc::new(AtomicUsize::new(0));
        let pool = Pool::new(
            1,
            2,
            4,
            Duration::from_secs(30),
            counting_factory(Arc::clone(&made)),
        )
        .await
        .unwrap();

        tokio::time::sleep(Duration::from_secs(31)).await;
        let conn = pool.get(None).await.unwrap();
        // The seeded connection aged out; a fresh one was built.
        assert_eq!(conn, FakeConn(1));
        assert_eq!(pool.active(), 1);
    }

    #[tokio::test]
    async fn active_count_never_exceeds_max() {
        let made = Arc::new(AtomicUsize::new(0));
        let pool = Pool::new(
            0,
            2,
            2,
            Duration::from_secs(60),
            counting_factory(Arc::clone(&made)),
        )
        .await
        .unwrap();

        let a = pool.get(None).await.unwrap();
        let b = pool.get(None).await.unwrap();
        assert_eq!(pool.active(), 2);
        let err = pool.get(Some(Duration::from_millis(50))).await.unwrap_err();
        assert!(matches!(err, RpcError::Timeout));
        assert_eq!(pool.active(), 2);
        pool.put(a);
        pool.put(b);
    }

    #[tokio::test]
    async fn saturated_pool_hands_returned_conn_to_first_waiter() {
        let made = Arc::new(AtomicUsize::new(0));
        let pool = Pool::new(
            0,
            1,
            1,
            Duration::from_secs(60),
            counting_factory(Arc::clone(&made)),
        )
        .await
        .unwrap();

        let held = pool.get(None).await.unwrap();
        let waiter_pool = pool.clone();
        let waiter =
            tokio::spawn(async move { waiter_pool.get(Some(Duration::from_secs(5))).await });
        // Let the waiter enqueue itself before the handback.
        tokio::time::sleep(Duration::from_millis(50)).await;
        pool.put(held);
        let got = waiter.await.unwrap().unwrap();
        // Direct handoff of the very same connection, not a new build.
        assert_eq!(got, FakeConn(0));
        assert_eq!(made.load(Ordering::SeqCst), 1);
        pool.put(got);
    }

    #[tokio::test]
    async fn late_fulfillment_flows_back_into_the_pool() {
        let made = Arc::new(AtomicUsize::new(0));
        let pool = Pool::new(
            0,
            1,
            1,
            Duration::from_secs(60),
            counting_factory(Arc::clone(&made)),
        )
        .await
        .unwrap();

        let held = pool.get(None).await.unwrap();
        let err = pool.get(Some(Duration::from_millis(20))).await.unwrap_err();
        assert!(matches!(err, RpcError::Timeout));
        // The handback lands on the abandoned waiter's forwarder, which
        // returns it to the idle list.
        pool.put(held);
        tokio::time::sleep(Duration::from_millis(50)).await;
        let got = pool.get(None).await.unwrap();
        assert_eq!(got, FakeConn(0));
        pool.put(got);
    }

    #[tokio::test]
    async fn close_is_idempotent_and_stops_gets() {
        let made = Arc::new(AtomicUsize::new(0));
        let pool = Pool::new(1, 2, 2, Duration::from_secs(60), counting_factory(made))
            .await
            .unwrap();
        pool.close();
        pool.close();
        assert!(matches!(
            pool.get(None).await.unwrap_err(),
            RpcError::PoolClosed
        ));
        assert_eq!(pool.active(), 0);
    }
}
