//! Parallel multi-source retrieval
//!
//! Provides:
//! - The `SearchAdapter` seam every backend implements
//! - Tracing and metrics decorators composed around adapters
//! - Hedged requests for slow sources
//! - The coordinator enforcing per-source limits, quotas and timeouts
//! - A static in-memory adapter for fixtures and tests

mod coordinator;
mod decorators;
mod fixture;
mod hedge;

pub use coordinator::RetrievalCoordinator;
pub use decorators::{MeteredAdapter, TracedAdapter};
pub use fixture::{Fixture, StaticAdapter};
pub use hedge::race_with_hedge;

use crate::types::SearchHit;
use fusegate_common::{Query, Result};

/// Common trait for all search backends
#[async_trait::async_trait]
pub trait SearchAdapter: Send + Sync {
    /// Return up to `top_k` hits ordered best first
    async fn search(&self, query: &Query, top_k: usize) -> Result<Vec<SearchHit>>;
}
