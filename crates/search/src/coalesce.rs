//! Single-flight request coalescing
//!
//! Concurrent calls with the same key share one execution:
//! - the first caller creates a slot and drives the computation
//! - later callers await the same shared future
//! - the computation runs on a spawned task and its slot removes itself
//!   exactly once when it settles, so failures never poison the key and
//!   cancelled callers never strand a slot
//!
//! With a `DistributedLock` wired in, the leader must also win the cluster
//! lock; a caller that loses it joins a local slot if one exists and
//! otherwise runs uncoalesced.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, Shared};
use fusegate_common::config::CoalesceConfig;
use fusegate_common::lock::{RedisLock, RedisLockConfig};
use fusegate_common::metrics::record_coalesce;
use fusegate_common::{DistributedLock, PipelineError};
use tokio::task::JoinError;
use tracing::{debug, info, warn};

use crate::types::SearchHit;

/// Coalescer for source calls
pub type SourceFlight = SingleFlight<Vec<SearchHit>, PipelineError>;

/// Build the source coalescer described by `config` (`None` when disabled)
pub async fn source_flight(
    config: &CoalesceConfig,
) -> fusegate_common::Result<Option<Arc<SourceFlight>>> {
    if !config.enabled {
        return Ok(None);
    }
    if !config.distributed {
        return Ok(Some(Arc::new(SingleFlight::new())));
    }

    let url = config.redis_url.clone().ok_or_else(|| PipelineError::Configuration {
        message: "coalesce.redis_url is required for distributed coalescing".to_string(),
    })?;
    let lock = RedisLock::connect(RedisLockConfig {
        url,
        key_prefix: config.key_prefix.clone(),
    })
    .await?;

    info!(ttl_ms = config.lock_ttl_ms, "Distributed coalescing enabled");
    Ok(Some(Arc::new(SingleFlight::with_lock(Arc::new(lock), config.lock_ttl()))))
}

type SharedResult<T, E> = Shared<BoxFuture<'static, Result<T, E>>>;

struct Slot<T, E> {
    id: u64,
    future: SharedResult<T, E>,
}

type SlotMap<T, E> = Arc<Mutex<HashMap<String, Slot<T, E>>>>;

/// Which path a call took
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoalesceRole {
    Leader,
    Joined,
    Uncoalesced,
}

impl CoalesceRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            CoalesceRole::Leader => "leader",
            CoalesceRole::Joined => "joined",
            CoalesceRole::Uncoalesced => "uncoalesced",
        }
    }
}

pub struct SingleFlight<T, E> {
    slots: SlotMap<T, E>,
    next_id: AtomicU64,
    lock: Option<Arc<dyn DistributedLock>>,
    lock_ttl: Duration,
}

impl<T, E> Default for SingleFlight<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + From<JoinError> + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T, E> SingleFlight<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + From<JoinError> + 'static,
{
    /// Process-local coalescer
    pub fn new() -> Self {
        Self {
            slots: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(0),
            lock: None,
            lock_ttl: Duration::from_secs(5),
        }
    }

    /// Coalescer that also coordinates through a cluster lock
    pub fn with_lock(lock: Arc<dyn DistributedLock>, lock_ttl: Duration) -> Self {
        Self {
            lock: Some(lock),
            lock_ttl,
            ..Self::new()
        }
    }

    /// Number of in-flight keys
    pub fn in_flight(&self) -> usize {
        self.slots.lock().map(|s| s.len()).unwrap_or_default()
    }

    /// Run `make()` once per key among concurrent callers
    pub async fn run<F, Fut>(&self, key: &str, make: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let (role, future) = match &self.lock {
            None => {
                let (future, created) = self.join_or_create(key, make, None);
                (if created { CoalesceRole::Leader } else { CoalesceRole::Joined }, future)
            }
            Some(lock) => self.run_distributed(lock, key, make).await,
        };

        record_coalesce(role.as_str());
        debug!(key, role = role.as_str(), "Coalesced call");

        future.await
    }

    async fn run_distributed<F, Fut>(
        &self,
        lock: &Arc<dyn DistributedLock>,
        key: &str,
        make: F,
    ) -> (CoalesceRole, SharedResult<T, E>)
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        if let Some(existing) = self.existing(key) {
            return (CoalesceRole::Joined, existing);
        }

        let acquired = match lock.try_acquire(key, self.lock_ttl).await {
            Ok(acquired) => acquired,
            Err(e) => {
                warn!(key, error = %e, "Distributed lock unavailable, running locally");
                false
            }
        };

        if acquired {
            let (future, created) = self.join_or_create(key, make, Some(lock.clone()));
            if !created {
                // Another local caller won the race after our lock; hand the lock back
                if let Err(e) = lock.release(key).await {
                    warn!(key, error = %e, "Failed to release distributed lock");
                }
                return (CoalesceRole::Joined, future);
            }
            return (CoalesceRole::Leader, future);
        }

        if let Some(existing) = self.existing(key) {
            return (CoalesceRole::Joined, existing);
        }

        let own: BoxFuture<'static, Result<T, E>> = make().boxed();
        (CoalesceRole::Uncoalesced, own.shared())
    }

    fn existing(&self, key: &str) -> Option<SharedResult<T, E>> {
        let slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        slots.get(key).map(|slot| slot.future.clone())
    }

    /// Atomically join the slot for `key` or install a new one
    ///
    /// The computation runs on its own task, so it settles and frees its slot
    /// even when every caller has gone away.
    fn join_or_create<F, Fut>(
        &self,
        key: &str,
        make: F,
        lock: Option<Arc<dyn DistributedLock>>,
    ) -> (SharedResult<T, E>, bool)
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(slot) = slots.get(key) {
            return (slot.future.clone(), false);
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let computation = make();
        let guard = SlotGuard {
            registry: self.slots.clone(),
            key: key.to_string(),
            id,
        };

        // The slot map stays locked until the insert below, so the guard cannot run first
        let task = tokio::spawn(async move {
            let result = computation.await;
            let key = guard.key.clone();
            drop(guard);

            if let Some(lock) = lock {
                if let Err(e) = lock.release(&key).await {
                    warn!(key = %key, error = %e, "Failed to release distributed lock");
                }
            }

            result
        });

        let future: BoxFuture<'static, Result<T, E>> = async move {
            match task.await {
                Ok(result) => result,
                Err(e) => Err(E::from(e)),
            }
        }
        .boxed();

        let shared = future.shared();
        slots.insert(key.to_string(), Slot { id, future: shared.clone() });
        (shared, true)
    }
}

/// Removes its slot when dropped, including when the computation panics
struct SlotGuard<T, E> {
    registry: SlotMap<T, E>,
    key: String,
    id: u64,
}

impl<T, E> Drop for SlotGuard<T, E> {
    fn drop(&mut self) {
        let mut slots = self.registry.lock().unwrap_or_else(|e| e.into_inner());
        if slots.get(&self.key).is_some_and(|slot| slot.id == self.id) {
            slots.remove(&self.key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use fusegate_common::Result as PipelineResult;
    use std::collections::HashSet;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::Mutex as AsyncMutex;

    #[tokio::test]
    async fn test_concurrent_callers_share_one_execution() {
        let flight: Arc<SingleFlight<u32, PipelineError>> = Arc::new(SingleFlight::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let flight = flight.clone();
                let calls = calls.clone();
                tokio::spawn(async move {
                    flight
                        .run("same", || async move {
                            calls.fetch_add(1, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(30)).await;
                            Ok::<_, PipelineError>(42)
                        })
                        .await
                })
            })
            .collect();

        for task in tasks {
            assert_eq!(task.await.unwrap(), Ok(42));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(flight.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_failure_does_not_poison_key() {
        let flight: SingleFlight<u32, PipelineError> = SingleFlight::new();

        let first = flight
            .run("k", || async { Err::<u32, _>(PipelineError::inference("boom")) })
            .await;
        assert_eq!(first, Err(PipelineError::inference("boom")));
        assert_eq!(flight.in_flight(), 0);

        let second = flight.run("k", || async { Ok::<_, PipelineError>(7) }).await;
        assert_eq!(second, Ok(7));
    }

    #[tokio::test]
    async fn test_cancelled_caller_still_settles_slot() {
        let flight: SingleFlight<u32, PipelineError> = SingleFlight::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let counter = calls.clone();
        let cancelled = tokio::time::timeout(
            Duration::from_millis(10),
            flight.run("k", || async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<_, PipelineError>(1)
            }),
        )
        .await;
        assert!(cancelled.is_err());
        assert_eq!(flight.in_flight(), 1);

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(flight.in_flight(), 0);

        let next = flight.run("k", || async { Ok::<_, PipelineError>(2) }).await;
        assert_eq!(next, Ok(2));
    }

    #[tokio::test]
    async fn test_source_flight_from_config() {
        let mut config = CoalesceConfig::default();
        assert!(source_flight(&config).await.unwrap().is_some());

        config.enabled = false;
        assert!(source_flight(&config).await.unwrap().is_none());

        config.enabled = true;
        config.distributed = true;
        config.redis_url = None;
        assert!(source_flight(&config).await.is_err());
    }

    #[tokio::test]
    async fn test_distinct_keys_run_independently() {
        let flight: SingleFlight<String, PipelineError> = SingleFlight::new();
        let (a, b) = tokio::join!(
            flight.run("a", || async { Ok::<_, PipelineError>("A".to_string()) }),
            flight.run("b", || async { Ok::<_, PipelineError>("B".to_string()) }),
        );
        assert_eq!(a.unwrap(), "A");
        assert_eq!(b.unwrap(), "B");
    }

    /// In-memory lock; `held_elsewhere` simulates another process owning a key
    #[derive(Default)]
    struct MemoryLock {
        held: AsyncMutex<HashSet<String>>,
        held_elsewhere: bool,
        releases: AtomicUsize,
    }

    #[async_trait]
    impl DistributedLock for MemoryLock {
        async fn try_acquire(&self, key: &str, _ttl: Duration) -> PipelineResult<bool> {
            if self.held_elsewhere {
                return Ok(false);
            }
            Ok(self.held.lock().await.insert(key.to_string()))
        }

        async fn release(&self, key: &str) -> PipelineResult<()> {
            self.held.lock().await.remove(key);
            self.releases.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_distributed_leader_releases_lock() {
        let lock = Arc::new(MemoryLock::default());
        let flight: SingleFlight<u32, PipelineError> =
            SingleFlight::with_lock(lock.clone(), Duration::from_secs(1));

        let out = flight.run("k", || async { Ok::<_, PipelineError>(1) }).await;
        assert_eq!(out, Ok(1));
        assert_eq!(lock.releases.load(Ordering::SeqCst), 1);
        assert!(lock.held.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_lock_held_elsewhere_runs_uncoalesced() {
        let lock = Arc::new(MemoryLock {
            held_elsewhere: true,
            ..Default::default()
        });
        let flight: SingleFlight<u32, PipelineError> =
            SingleFlight::with_lock(lock.clone(), Duration::from_secs(1));

        let out = flight.run("k", || async { Ok::<_, PipelineError>(9) }).await;
        assert_eq!(out, Ok(9));
        assert_eq!(lock.releases.load(Ordering::SeqCst), 0);
        assert_eq!(flight.in_flight(), 0);
    }
}
