//! Process-wide inference permit pool and request time budget

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::timeout;

#[derive(Debug, Default)]
struct PermitStats {
    acquired: AtomicU64,
    released: AtomicU64,
}

/// Bounded pool of inference permits with acquire/release counters
#[derive(Debug, Clone)]
pub struct PermitPool {
    semaphore: Arc<Semaphore>,
    stats: Arc<PermitStats>,
}

/// Held permit; releases on drop
#[derive(Debug)]
pub struct PermitLease {
    _permit: OwnedSemaphorePermit,
    stats: Arc<PermitStats>,
}

impl Drop for PermitLease {
    fn drop(&mut self) {
        self.stats.released.fetch_add(1, Ordering::SeqCst);
    }
}

impl PermitPool {
    pub fn new(permits: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(permits.max(1))),
            stats: Arc::new(PermitStats::default()),
        }
    }

    /// Wait up to `wait` for a permit
    pub async fn acquire(&self, wait: Duration) -> Option<PermitLease> {
        let permit = match timeout(wait, self.semaphore.clone().acquire_owned()).await {
            Ok(Ok(permit)) => permit,
            _ => return None,
        };

        self.stats.acquired.fetch_add(1, Ordering::SeqCst);
        Some(PermitLease {
            _permit: permit,
            stats: self.stats.clone(),
        })
    }

    pub fn acquired(&self) -> u64 {
        self.stats.acquired.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> u64 {
        self.stats.released.load(Ordering::SeqCst)
    }

    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }
}

/// Deadline for the remaining work of one request
#[derive(Debug, Clone, Copy)]
pub struct TimeBudget {
    deadline: Instant,
}

impl TimeBudget {
    pub fn new(total: Duration) -> Self {
        Self {
            deadline: Instant::now() + total,
        }
    }

    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining().is_zero()
    }
}
