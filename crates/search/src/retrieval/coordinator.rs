//! Retrieval coordinator
//!
//! Fans a query out to every source the routing hints enable. Each source
//! call runs under its own semaphore, optional request quota and timeout.
//! Timeouts, saturation and adapter errors degrade that source to an empty
//! list; they are never propagated.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Instant;

use futures::future::join_all;
use fusegate_common::config::{SourceConfig, SourceKind};
use fusegate_common::metrics::{record_retrieval, SourceOutcome};
use fusegate_common::{PipelineError, Query, Result};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use tokio::sync::Semaphore;
use tokio::time::timeout;
use tracing::{info, warn};

use super::{race_with_hedge, MeteredAdapter, SearchAdapter, TracedAdapter};
use crate::coalesce::SourceFlight;
use crate::routing::RoutingHints;
use crate::types::{rank_hits, SearchHit, SourceResults};

struct SourceHandle {
    config: SourceConfig,
    adapter: Arc<dyn SearchAdapter>,
    limiter: Arc<Semaphore>,
    quota: Option<DefaultDirectRateLimiter>,
}

impl SourceHandle {
    /// Requested hit count, or `None` when the hints disable this source
    fn top_k(&self, hints: &RoutingHints) -> Option<usize> {
        match self.config.kind {
            SourceKind::Web => {
                (hints.enable_web && hints.web_top_k > 0).then_some(hints.web_top_k)
            }
            SourceKind::Vector => (hints.vector_top_k > 0).then_some(hints.vector_top_k),
            SourceKind::KnowledgeGraph => {
                (hints.enable_second_pass && hints.vector_top_k > 0).then_some(hints.vector_top_k)
            }
        }
    }

    async fn fetch(self: Arc<Self>, query: Query, top_k: usize) -> Result<Vec<SearchHit>> {
        let name = &self.config.name;

        if let Some(quota) = &self.quota {
            if quota.check().is_err() {
                return Err(PipelineError::ConcurrencyExhausted {
                    pool: format!("{}:quota", name),
                });
            }
        }

        let acquire = self.limiter.clone().acquire_owned();
        let _permit = match timeout(self.config.acquire_timeout(), acquire).await {
            Ok(Ok(permit)) => permit,
            _ => {
                return Err(PipelineError::ConcurrencyExhausted { pool: name.clone() });
            }
        };

        let call = async {
            match self.config.hedge_delay() {
                Some(delay) => {
                    race_with_hedge(name, delay, &self.limiter, || {
                        self.adapter.search(&query, top_k)
                    })
                    .await
                }
                None => self.adapter.search(&query, top_k).await,
            }
        };

        match timeout(self.config.timeout(), call).await {
            Ok(result) => result,
            Err(_) => Err(PipelineError::SourceTimeout {
                source_name: name.clone(),
                timeout_ms: self.config.timeout_ms,
            }),
        }
    }
}

#[derive(Default)]
pub struct RetrievalCoordinator {
    sources: Vec<Arc<SourceHandle>>,
    coalescer: Option<Arc<SourceFlight>>,
}

impl RetrievalCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Share identical in-flight source calls through `flight`
    pub fn with_coalescer(mut self, flight: Arc<SourceFlight>) -> Self {
        self.coalescer = Some(flight);
        self
    }

    /// Register a source; the adapter is wrapped in tracing and metrics decorators
    pub fn with_source(mut self, config: SourceConfig, adapter: Arc<dyn SearchAdapter>) -> Self {
        let metered: Arc<dyn SearchAdapter> = Arc::new(MeteredAdapter::new(adapter, &config.name));
        let traced: Arc<dyn SearchAdapter> = Arc::new(TracedAdapter::new(metered, &config.name));

        let quota = config
            .requests_per_second
            .and_then(NonZeroU32::new)
            .map(|rps| RateLimiter::direct(Quota::per_second(rps)));

        self.sources.push(Arc::new(SourceHandle {
            limiter: Arc::new(Semaphore::new(config.max_concurrency.max(1))),
            adapter: traced,
            quota,
            config,
        }));
        self
    }

    pub fn source_names(&self) -> Vec<&str> {
        self.sources.iter().map(|s| s.config.name.as_str()).collect()
    }

    /// Free permits of a source's limiter
    pub fn available_permits(&self, source: &str) -> Option<usize> {
        self.sources
            .iter()
            .find(|s| s.config.name == source)
            .map(|s| s.limiter.available_permits())
    }

    /// Query every enabled source concurrently and wait for all of them
    pub async fn retrieve(&self, query: &Query, hints: &RoutingHints) -> SourceResults {
        let calls = self
            .sources
            .iter()
            .filter_map(|handle| handle.top_k(hints).map(|k| (handle.clone(), k)))
            .map(|(handle, top_k)| self.call_source(handle, query, top_k));

        let results: SourceResults = join_all(calls).await.into_iter().collect();

        info!(
            request_id = %query.request_id,
            sources = results.len(),
            hits = results.values().map(Vec::len).sum::<usize>(),
            "Retrieval completed"
        );
        results
    }

    async fn call_source(
        &self,
        handle: Arc<SourceHandle>,
        query: &Query,
        top_k: usize,
    ) -> (String, Vec<crate::types::RankedHit>) {
        let name = handle.config.name.clone();
        let kind = handle.config.kind;
        let start = Instant::now();

        let result = match &self.coalescer {
            Some(flight) => {
                let key = format!("{}|{}|{}", name, top_k, query.normalized_text());
                let owned = query.clone();
                flight.run(&key, move || handle.fetch(owned, top_k)).await
            }
            None => handle.fetch(query.clone(), top_k).await,
        };

        match result {
            Ok(hits) => (name, rank_hits(hits)),
            Err(e) => {
                let outcome = match &e {
                    PipelineError::SourceTimeout { .. } => SourceOutcome::Timeout,
                    PipelineError::ConcurrencyExhausted { .. } => SourceOutcome::Saturated,
                    _ => SourceOutcome::Error,
                };
                // Adapter errors are already counted by the metrics decorator
                if outcome != SourceOutcome::Error {
                    record_retrieval(&name, outcome, start.elapsed().as_secs_f64(), 0);
                }
                warn!(
                    request_id = %query.request_id,
                    source = %name,
                    kind = kind.as_str(),
                    outcome = outcome.as_str(),
                    error = %e,
                    "Source degraded to empty"
                );
                (name, Vec::new())
            }
        }
    }
}
