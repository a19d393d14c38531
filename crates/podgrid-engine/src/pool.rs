//! Per-host engine leases.
//!
//! Providers are not reused between operations. What the pool bounds is
//! concurrency: each host gets a semaphore, and a lease holds one permit
//! for as long as it lives. Dropping the lease on any path returns it.

use std::collections::HashMap;
use std::ops::Deref;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};
use tracing::debug;

use crate::error::{EngineError, EngineResult};
use crate::provider::{EngineConnector, EngineProvider};

/// Default bound on concurrent leases per host.
pub const DEFAULT_PER_HOST_LIMIT: usize = 16;

/// Hands out bounded, scoped providers per host address.
pub struct EnginePool {
    connector: Arc<dyn EngineConnector>,
    /// 0 disables the bound.
    per_host_limit: usize,
    permits: Mutex<HashMap<String, Arc<Semaphore>>>,
}

impl EnginePool {
    pub fn new(connector: impl EngineConnector + 'static) -> Self {
        Self::from_shared(Arc::new(connector))
    }

    pub fn from_shared(connector: Arc<dyn EngineConnector>) -> Self {
        Self {
            connector,
            per_host_limit: DEFAULT_PER_HOST_LIMIT,
            permits: Mutex::new(HashMap::new()),
        }
    }

    /// Bound concurrent leases per host. `0` means unbounded.
    pub fn with_per_host_limit(mut self, limit: usize) -> Self {
        self.per_host_limit = limit;
        self
    }

    pub fn backend(&self) -> &'static str {
        self.connector.backend()
    }

    pub fn per_host_limit(&self) -> usize {
        self.per_host_limit
    }

    async fn semaphore(&self, host: &str) -> Option<Arc<Semaphore>> {
        if self.per_host_limit == 0 {
            return None;
        }
        let mut permits = self.permits.lock().await;
        let semaphore = permits
            .entry(host.to_string())
            .or_insert_with(|| Arc::new(Semaphore::new(self.per_host_limit)));
        Some(Arc::clone(semaphore))
    }

    /// Wait for a slot on `host`, then connect.
    ///
    /// The permit is released if connecting fails.
    pub async fn acquire(&self, host: &str) -> EngineResult<EngineLease> {
        let permit = match self.semaphore(host).await {
            Some(semaphore) => Some(semaphore.acquire_owned().await.map_err(|_| {
                EngineError::Unreachable {
                    host: host.to_string(),
                    reason: "engine pool closed".into(),
                }
            })?),
            None => None,
        };

        let provider = self.connector.connect(host).await?;
        debug!(host = %host, backend = self.backend(), "engine lease acquired");
        Ok(EngineLease {
            provider,
            _permit: permit,
        })
    }

    /// Free slots on `host`, or `None` when unbounded.
    pub async fn available(&self, host: &str) -> Option<usize> {
        self.semaphore(host).await.map(|s| s.available_permits())
    }
}

impl std::fmt::Debug for EnginePool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnginePool")
            .field("backend", &self.backend())
            .field("per_host_limit", &self.per_host_limit)
            .finish()
    }
}

/// A provider scoped to one logical operation.
pub struct EngineLease {
    provider: Box<dyn EngineProvider>,
    _permit: Option<OwnedSemaphorePermit>,
}

impl Deref for EngineLease {
    type Target = dyn EngineProvider;

    fn deref(&self) -> &Self::Target {
        self.provider.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::memory::MemoryFleet;

    #[tokio::test]
    async fn leases_are_bounded_per_host() {
        let pool = EnginePool::new(MemoryFleet::new()).with_per_host_limit(1);

        let first = pool.acquire("tcp://a:2375").await.unwrap();
        assert_eq!(first.host(), "tcp://a:2375");
        assert_eq!(pool.available("tcp://a:2375").await, Some(0));

        let blocked =
            tokio::time::timeout(Duration::from_millis(50), pool.acquire("tcp://a:2375")).await;
        assert!(blocked.is_err(), "second lease should wait for the first");

        // Other hosts are unaffected.
        let other = pool.acquire("tcp://b:2375").await.unwrap();
        assert_eq!(other.host(), "tcp://b:2375");

        drop(first);
        let second =
            tokio::time::timeout(Duration::from_millis(50), pool.acquire("tcp://a:2375")).await;
        assert!(second.is_ok_and(|lease| lease.is_ok()));
    }

    #[tokio::test]
    async fn failed_connect_releases_permit() {
        let fleet = MemoryFleet::new();
        fleet.mark_unreachable("tcp://down:2375");
        let pool = EnginePool::new(fleet).with_per_host_limit(2);

        let err = pool.acquire("tcp://down:2375").await.err().unwrap();
        assert!(matches!(err, EngineError::Unreachable { .. }));
        assert_eq!(pool.available("tcp://down:2375").await, Some(2));
    }

    #[tokio::test]
    async fn zero_limit_is_unbounded() {
        let pool = EnginePool::new(MemoryFleet::new()).with_per_host_limit(0);
        let leases: Vec<_> = futures_util::future::join_all(
            (0..32).map(|_| pool.acquire("tcp://a:2375")),
        )
        .await;
        assert!(leases.iter().all(Result::is_ok));
        assert_eq!(pool.available("tcp://a:2375").await, None);
    }
}
