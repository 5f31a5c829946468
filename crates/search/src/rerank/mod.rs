//! Cross-encoder reranking under a time budget and a shared permit pool
//!
//! Every exit path is a documented fallback:
//! - no scorer wired or reranking disabled: passthrough
//! - budget already spent: fused order
//! - pool saturated: bi-encoder fallback when wired, else fused order
//! - scoring overruns the budget: fused order
//!
//! A failing candidate keeps its fused score. Output never exceeds the
//! requested count.

mod overlap;
mod permits;

pub use overlap::TokenOverlapScorer;
pub use permits::{PermitLease, PermitPool, TimeBudget};

use std::sync::Arc;

use futures::future::join_all;
use fusegate_common::config::CrossEncoderConfig;
use fusegate_common::metrics::record_rerank;
use fusegate_common::{EvidenceItem, Result};
use serde::Serialize;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Query/passage relevance model
#[async_trait::async_trait]
pub trait InferenceScorer: Send + Sync {
    fn name(&self) -> &str;

    /// Relevance of `passage` to `query`; may fail per call
    async fn score(&self, query: &str, passage: &str) -> Result<f64>;
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RerankStrategy {
    CrossEncoder,
    BiEncoderFallback,
    Passthrough,
    BudgetExhausted,
    Saturated,
    TimedOut,
    /// Routing did not ask for reranking
    Skipped,
}

impl RerankStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            RerankStrategy::CrossEncoder => "cross_encoder",
            RerankStrategy::BiEncoderFallback => "bi_encoder_fallback",
            RerankStrategy::Passthrough => "passthrough",
            RerankStrategy::BudgetExhausted => "budget_exhausted",
            RerankStrategy::Saturated => "saturated",
            RerankStrategy::TimedOut => "timed_out",
            RerankStrategy::Skipped => "skipped",
        }
    }
}

#[derive(Debug, Clone)]
pub struct RerankOutcome {
    pub items: Vec<EvidenceItem>,
    pub strategy: RerankStrategy,
    pub item_failures: usize,
}

/// Text the scorer sees for one evidence item
fn passage(item: &EvidenceItem) -> String {
    if item.snippet.is_empty() {
        item.title.clone()
    } else {
        format!("{}\n{}", item.title, item.snippet)
    }
}

fn reassign_ranks(items: &mut [EvidenceItem]) {
    for (i, item) in items.iter_mut().enumerate() {
        item.rank = i + 1;
    }
}

/// Fused order cut to `requested`
fn truncated(mut items: Vec<EvidenceItem>, requested: usize) -> Vec<EvidenceItem> {
    items.truncate(requested);
    reassign_ranks(&mut items);
    items
}

pub struct CrossEncoderReranker {
    config: CrossEncoderConfig,
    scorer: Option<Arc<dyn InferenceScorer>>,
    fallback: Option<Arc<dyn InferenceScorer>>,
    pool: PermitPool,
}

impl CrossEncoderReranker {
    /// Reranker with no backend (passthrough until a scorer is wired)
    pub fn new(config: CrossEncoderConfig) -> Self {
        Self {
            pool: PermitPool::new(config.max_concurrency),
            config,
            scorer: None,
            fallback: None,
        }
    }

    pub fn with_scorer(mut self, scorer: Arc<dyn InferenceScorer>) -> Self {
        self.scorer = Some(scorer);
        self
    }

    /// Scorer used when the permit pool is saturated and fallback is enabled
    pub fn with_fallback(mut self, scorer: Arc<dyn InferenceScorer>) -> Self {
        self.fallback = Some(scorer);
        self
    }

    pub fn pool(&self) -> &PermitPool {
        &self.pool
    }

    /// Rerank fused evidence, returning at most `requested` items
    pub async fn rerank(
        &self,
        query: &str,
        items: Vec<EvidenceItem>,
        requested: usize,
        budget: &TimeBudget,
    ) -> RerankOutcome {
        let outcome = self.rerank_inner(query, items, requested, budget).await;
        record_rerank(outcome.strategy.as_str(), outcome.item_failures);
        info!(
            strategy = outcome.strategy.as_str(),
            returned = outcome.items.len(),
            item_failures = outcome.item_failures,
            "Rerank finished"
        );
        outcome
    }

    async fn rerank_inner(
        &self,
        query: &str,
        items: Vec<EvidenceItem>,
        requested: usize,
        budget: &TimeBudget,
    ) -> RerankOutcome {
        let fused_order = |items, strategy| RerankOutcome {
            items: truncated(items, requested),
            strategy,
            item_failures: 0,
        };

        let scorer = match &self.scorer {
            Some(scorer) if self.config.enabled => scorer.clone(),
            _ => return fused_order(items, RerankStrategy::Passthrough),
        };

        if budget.is_exhausted() {
            warn!("Rerank budget exhausted before start");
            return fused_order(items, RerankStrategy::BudgetExhausted);
        }

        let wait = self.config.queue_timeout().min(budget.remaining());
        let (_lease, scorer, strategy) = match self.pool.acquire(wait).await {
            Some(lease) => (Some(lease), scorer, RerankStrategy::CrossEncoder),
            None => match &self.fallback {
                Some(fallback) if self.config.fallback_to_bi_encoder => {
                    debug!(
                        scorer = fallback.name(),
                        "Permit pool saturated, using fallback scorer"
                    );
                    (None, fallback.clone(), RerankStrategy::BiEncoderFallback)
                }
                _ => {
                    warn!(pool = self.config.max_concurrency, "Permit pool saturated");
                    return fused_order(items, RerankStrategy::Saturated);
                }
            },
        };

        let top_n = self.config.top_n.min(items.len());
        let head: Vec<EvidenceItem> = items[..top_n].to_vec();

        let scoring = join_all(head.iter().map(|item| {
            let text = passage(item);
            let scorer = scorer.clone();
            async move { scorer.score(query, &text).await }
        }));

        let scores = match timeout(budget.remaining(), scoring).await {
            Ok(scores) => scores,
            Err(_) => {
                warn!(scorer = scorer.name(), "Scoring overran the time budget");
                return fused_order(items, RerankStrategy::TimedOut);
            }
        };

        let mut item_failures = 0;
        let mut reranked: Vec<EvidenceItem> = head
            .into_iter()
            .zip(scores)
            .map(|(mut item, score)| {
                match score {
                    Ok(s) if s.is_finite() => item.fused_score = s,
                    Ok(s) => {
                        item_failures += 1;
                        warn!(
                            key = %item.canonical_key,
                            score = s,
                            "Non-finite score, keeping fused score"
                        );
                    }
                    Err(e) => {
                        item_failures += 1;
                        warn!(
                            key = %item.canonical_key,
                            error = %e,
                            "Scoring failed, keeping fused score"
                        );
                    }
                }
                item
            })
            .collect();

        reranked.sort_by(|a, b| {
            b.fused_score
                .total_cmp(&a.fused_score)
                .then_with(|| a.canonical_key.cmp(&b.canonical_key))
        });
        reranked.extend(items.into_iter().skip(top_n));

        RerankOutcome {
            items: truncated(reranked, requested),
            strategy,
            item_failures,
        }
    }
}
