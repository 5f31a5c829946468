//! Hedged requests
//!
//! After `delay` without a primary result, a duplicate request is launched
//! if the source limiter has a spare permit. Whichever finishes first wins;
//! the loser is dropped.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use fusegate_common::metrics::record_hedge;
use tokio::sync::Semaphore;
use tracing::debug;

pub async fn race_with_hedge<T, F, Fut>(
    source: &str,
    delay: Duration,
    limiter: &Arc<Semaphore>,
    make: F,
) -> T
where
    F: Fn() -> Fut,
    Fut: Future<Output = T>,
{
    let primary = make();
    tokio::pin!(primary);

    tokio::select! {
        out = &mut primary => return out,
        _ = tokio::time::sleep(delay) => {}
    }

    // The hedge holds its own permit for as long as it runs
    let Ok(_hedge_permit) = limiter.clone().try_acquire_owned() else {
        debug!(source, "No spare permit, hedge skipped");
        return primary.await;
    };

    record_hedge(source);
    debug!(source, delay_ms = delay.as_millis() as u64, "Hedge launched");

    let hedge = make();
    tokio::pin!(hedge);

    tokio::select! {
        out = &mut primary => out,
        out = &mut hedge => {
            debug!(source, "Hedge won");
            out
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Instant;

    /// First call is slow, later calls are fast
    fn slow_then_fast(
        calls: Arc<AtomicUsize>,
    ) -> impl Fn() -> std::pin::Pin<Box<dyn Future<Output = &'static str> + Send>> {
        move || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            Box::pin(async move {
                if n == 0 {
                    tokio::time::sleep(Duration::from_millis(300)).await;
                    "primary"
                } else {
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    "hedge"
                }
            })
        }
    }

    #[tokio::test]
    async fn test_fast_primary_skips_hedge() {
        let calls = Arc::new(AtomicUsize::new(0));
        let limiter = Arc::new(Semaphore::new(2));
        let counter = calls.clone();

        let out = race_with_hedge("web", Duration::from_millis(50), &limiter, || {
            counter.fetch_add(1, Ordering::SeqCst);
            async { "primary" }
        })
        .await;

        assert_eq!(out, "primary");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_hedge_wins_over_slow_primary() {
        let calls = Arc::new(AtomicUsize::new(0));
        let limiter = Arc::new(Semaphore::new(2));

        let start = Instant::now();
        let attempt = slow_then_fast(calls.clone());
        let out = race_with_hedge("web", Duration::from_millis(20), &limiter, attempt).await;

        assert_eq!(out, "hedge");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(start.elapsed() < Duration::from_millis(250));
        assert_eq!(limiter.available_permits(), 2);
    }

    #[tokio::test]
    async fn test_no_spare_permit_no_hedge() {
        let calls = Arc::new(AtomicUsize::new(0));
        let limiter = Arc::new(Semaphore::new(0));

        let attempt = slow_then_fast(calls.clone());
        let out = race_with_hedge("web", Duration::from_millis(20), &limiter, attempt).await;

        assert_eq!(out, "primary");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
