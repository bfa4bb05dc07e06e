//! Lazily initialized store pool
//!
//! The pool handle is the only shared mutable state in the engine. The
//! common path takes a read lock and clones the handle; the first caller
//! takes the write lock, re-checks, and initializes. Callers that arrived
//! while an initialization was in flight and saw it fail observe that same
//! failure instead of retrying immediately.

use crate::error::{EngineError, EngineResult};
use crate::store::StoreConnector;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

/// A live store handle and its last liveness check
struct LivePool<S> {
    store: Arc<S>,
    checked_at: Mutex<Instant>,
}

impl<S> LivePool<S> {
    fn new(store: Arc<S>) -> Self {
        Self {
            store,
            checked_at: Mutex::new(Instant::now()),
        }
    }

    /// Claim the next liveness check if one is due
    fn claim_check(&self, period: Duration) -> bool {
        if period.is_zero() {
            return false;
        }
        let mut checked_at = self.checked_at.lock();
        if checked_at.elapsed() < period {
            return false;
        }
        *checked_at = Instant::now();
        true
    }
}

struct PoolState<S> {
    live: Option<Arc<LivePool<S>>>,
    /// Error of the most recent failed attempt
    last_failure: Option<String>,
}

/// Owns the store handle lifecycle: lazy init, liveness checks, teardown
pub struct ConnectionPoolManager<C: StoreConnector> {
    connector: C,
    state: RwLock<PoolState<C::Store>>,
    /// Completed initialization attempts, read without the lock
    completed: AtomicU64,
    health_check: Duration,
}

impl<C: StoreConnector> ConnectionPoolManager<C> {
    pub fn new(connector: C, health_check: Duration) -> Self {
        Self {
            connector,
            state: RwLock::new(PoolState {
                live: None,
                last_failure: None,
            }),
            completed: AtomicU64::new(0),
            health_check,
        }
    }

    /// Return the store handle, creating it on first use
    pub async fn ensure(&self) -> EngineResult<Arc<C::Store>> {
        let observed = self.completed.load(Ordering::SeqCst);
        let live = self.state.read().await.live.clone();
        let Some(live) = live else {
            return self.initialize(observed).await;
        };

        if live.claim_check(self.health_check) {
            if let Err(e) = self.connector.ping(&live.store).await {
                warn!(error = %e, store = %self.connector.target(), "Pool liveness check failed");
                self.discard(&live).await;
                return Err(e);
            }
            debug!("Pool liveness check passed");
        }
        Ok(Arc::clone(&live.store))
    }

    async fn initialize(&self, observed_attempts: u64) -> EngineResult<Arc<C::Store>> {
        let mut state = self.state.write().await;

        // Another caller initialized while we waited for the write lock
        if let Some(live) = &state.live {
            return Ok(Arc::clone(&live.store));
        }

        // Another caller failed while we waited; share its outcome
        if self.completed.load(Ordering::SeqCst) > observed_attempts {
            if let Some(reason) = &state.last_failure {
                return Err(EngineError::StoreUnavailable(reason.clone()));
            }
        }

        let result = self.connector.connect().await;
        let attempt = self.completed.fetch_add(1, Ordering::SeqCst) + 1;
        match result {
            Ok(store) => {
                info!(
                    store = %self.connector.target(),
                    attempt,
                    "Store pool initialized"
                );
                state.live = Some(Arc::new(LivePool::new(Arc::clone(&store))));
                state.last_failure = None;
                Ok(store)
            }
            Err(e) => {
                error!(
                    store = %self.connector.target(),
                    attempt,
                    error = %e,
                    "Store pool initialization failed"
                );
                let reason = match e {
                    EngineError::StoreUnavailable(reason) => reason,
                    other => other.to_string(),
                };
                state.last_failure = Some(reason.clone());
                Err(EngineError::StoreUnavailable(reason))
            }
        }
    }

    /// Drop a handle that failed its liveness check, unless already replaced
    async fn discard(&self, live: &Arc<LivePool<C::Store>>) {
        let current = {
            let mut state = self.state.write().await;
            let current = matches!(&state.live, Some(cur) if Arc::ptr_eq(cur, live));
            if current {
                state.live = None;
            }
            current
        };
        // Close outside the lock; draining waits for checked-out connections
        if current {
            self.connector.close(&live.store).await;
        }
    }

    /// Close the pool; the next `ensure` reinitializes
    pub async fn teardown(&self) -> bool {
        let taken = {
            let mut state = self.state.write().await;
            state.last_failure = None;
            state.live.take()
        };
        match taken {
            Some(live) => {
                self.connector.close(&live.store).await;
                info!(store = %self.connector.target(), "Store pool closed");
                true
            }
            None => false,
        }
    }

    pub async fn is_initialized(&self) -> bool {
        self.state.read().await.live.is_some()
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryConnector, MemoryStore, StoreConnector};
    use async_trait::async_trait;

    /// Memory connector whose close waits like a pool draining connections
    struct DrainingConnector {
        inner: MemoryConnector,
        drain: Duration,
    }

    #[async_trait]
    impl StoreConnector for DrainingConnector {
        type Store = MemoryStore;

        async fn connect(&self) -> EngineResult<Arc<MemoryStore>> {
            self.inner.connect().await
        }

        async fn ping(&self, store: &MemoryStore) -> EngineResult<()> {
            self.inner.ping(store).await
        }

        async fn close(&self, store: &MemoryStore) {
            tokio::time::sleep(self.drain).await;
            self.inner.close(store).await;
        }

        fn target(&self) -> String {
            "draining".to_string()
        }
    }

    fn manager() -> ConnectionPoolManager<MemoryConnector> {
        ConnectionPoolManager::new(
            MemoryConnector::new(Arc::new(MemoryStore::new())),
            Duration::ZERO,
        )
    }

    #[tokio::test]
    async fn test_lazy_init() {
        let pool = manager();
        assert!(!pool.is_initialized().await);
        assert_eq!(pool.connector().connect_count(), 0);

        let first = pool.ensure().await.unwrap();
        let second = pool.ensure().await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(pool.connector().connect_count(), 1);
    }

    #[tokio::test]
    async fn test_teardown_then_reinitialize() {
        let pool = manager();
        pool.ensure().await.unwrap();

        assert!(pool.teardown().await);
        assert!(!pool.is_initialized().await);
        assert_eq!(pool.connector().close_count(), 1);
        assert!(!pool.teardown().await);

        pool.ensure().await.unwrap();
        assert_eq!(pool.connector().connect_count(), 2);
    }

    #[tokio::test]
    async fn test_init_failure_is_not_permanent() {
        let pool = manager();
        pool.connector().set_unavailable(true);

        assert!(matches!(
            pool.ensure().await,
            Err(EngineError::StoreUnavailable(_))
        ));
        assert!(!pool.is_initialized().await);

        pool.connector().set_unavailable(false);
        assert!(pool.ensure().await.is_ok());
    }

    #[tokio::test]
    async fn test_failed_liveness_check_discards_pool() {
        let pool = ConnectionPoolManager::new(
            MemoryConnector::new(Arc::new(MemoryStore::new())),
            Duration::from_millis(1),
        );
        pool.ensure().await.unwrap();

        tokio::time::sleep(Duration::from_millis(5)).await;
        pool.connector().set_unavailable(true);
        assert!(pool.ensure().await.is_err());
        assert!(!pool.is_initialized().await);
        assert_eq!(pool.connector().close_count(), 1);

        pool.connector().set_unavailable(false);
        assert!(pool.ensure().await.is_ok());
        assert_eq!(pool.connector().connect_count(), 2);
    }

    #[tokio::test]
    async fn test_teardown_does_not_block_ensure() {
        let pool = Arc::new(ConnectionPoolManager::new(
            DrainingConnector {
                inner: MemoryConnector::new(Arc::new(MemoryStore::new())),
                drain: Duration::from_secs(10),
            },
            Duration::ZERO,
        ));
        pool.ensure().await.unwrap();

        let closing = tokio::spawn({
            let pool = Arc::clone(&pool);
            async move { pool.teardown().await }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!closing.is_finished());

        let reopened = tokio::time::timeout(Duration::from_millis(500), pool.ensure()).await;
        assert!(matches!(reopened, Ok(Ok(_))));
        assert_eq!(pool.connector().inner.connect_count(), 2);
        closing.abort();
    }
}
