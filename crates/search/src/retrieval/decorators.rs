//! Adapter decorators

use std::sync::Arc;
use std::time::Instant;

use fusegate_common::metrics::{record_retrieval, SourceOutcome};
use fusegate_common::{Query, Result};
use tracing::{debug, warn};

use super::SearchAdapter;
use crate::types::SearchHit;

/// Logs each call with its latency and hit count
pub struct TracedAdapter {
    inner: Arc<dyn SearchAdapter>,
    source: String,
}

impl TracedAdapter {
    pub fn new(inner: Arc<dyn SearchAdapter>, source: impl Into<String>) -> Self {
        Self {
            inner,
            source: source.into(),
        }
    }
}

#[async_trait::async_trait]
impl SearchAdapter for TracedAdapter {
    async fn search(&self, query: &Query, top_k: usize) -> Result<Vec<SearchHit>> {
        let start = Instant::now();
        let result = self.inner.search(query, top_k).await;
        let elapsed_ms = start.elapsed().as_millis() as u64;

        match &result {
            Ok(hits) => debug!(
                request_id = %query.request_id,
                source = %self.source,
                top_k,
                hits = hits.len(),
                elapsed_ms,
                "Source search completed"
            ),
            Err(e) => warn!(
                request_id = %query.request_id,
                source = %self.source,
                elapsed_ms,
                error = %e,
                "Source search failed"
            ),
        }
        result
    }
}

/// Records latency and ok/error outcome for each completed call
pub struct MeteredAdapter {
    inner: Arc<dyn SearchAdapter>,
    source: String,
}

impl MeteredAdapter {
    pub fn new(inner: Arc<dyn SearchAdapter>, source: impl Into<String>) -> Self {
        Self {
            inner,
            source: source.into(),
        }
    }
}

#[async_trait::async_trait]
impl SearchAdapter for MeteredAdapter {
    async fn search(&self, query: &Query, top_k: usize) -> Result<Vec<SearchHit>> {
        let start = Instant::now();
        let result = self.inner.search(query, top_k).await;
        let duration = start.elapsed().as_secs_f64();

        match &result {
            Ok(hits) => record_retrieval(&self.source, SourceOutcome::Ok, duration, hits.len()),
            Err(_) => record_retrieval(&self.source, SourceOutcome::Error, duration, 0),
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieval::StaticAdapter;

    #[tokio::test]
    async fn test_decorators_pass_results_through() {
        let hits = vec![SearchHit::with_id("a", "A", 0.9), SearchHit::with_id("b", "B", 0.5)];
        let base: Arc<dyn SearchAdapter> = Arc::new(StaticAdapter::new(hits.clone()));
        let metered: Arc<dyn SearchAdapter> = Arc::new(MeteredAdapter::new(base, "vector"));
        let traced = TracedAdapter::new(metered, "vector");

        let out = traced.search(&Query::new("q"), 10).await.unwrap();
        assert_eq!(out, hits);
    }

    #[tokio::test]
    async fn test_decorators_pass_errors_through() {
        let base: Arc<dyn SearchAdapter> = Arc::new(StaticAdapter::failing("backend down"));
        let traced = TracedAdapter::new(Arc::new(MeteredAdapter::new(base, "web")), "web");
        tokio_test::assert_err!(traced.search(&Query::new("q"), 5).await);
    }
}
