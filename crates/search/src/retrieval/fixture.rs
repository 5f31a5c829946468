//! Static in-memory adapter
//!
//! Serves canned hits with optional latency or failure. The probe binary
//! loads these from a JSON fixture so the whole pipeline runs without any
//! real backend.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use fusegate_common::{PipelineError, Query, Result};
use serde::Deserialize;

use super::SearchAdapter;
use crate::types::SearchHit;

/// Per-source canned hits, e.g. `{"sources": {"web": [{"url": ..., "raw_score": 0.8}]}}`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Fixture {
    #[serde(default)]
    pub sources: HashMap<String, Vec<SearchHit>>,

    /// Artificial latency per source in milliseconds
    #[serde(default)]
    pub latency_ms: HashMap<String, u64>,
}

impl Fixture {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| PipelineError::Configuration {
            message: format!("invalid fixture: {}", e),
        })
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| PipelineError::Configuration {
            message: format!("cannot read fixture {}: {}", path.display(), e),
        })?;
        Self::from_json(&json)
    }

    /// Adapter serving the hits recorded for `source` (empty when absent)
    pub fn adapter(&self, source: &str) -> StaticAdapter {
        let adapter = StaticAdapter::new(self.sources.get(source).cloned().unwrap_or_default());
        match self.latency_ms.get(source) {
            Some(ms) => adapter.with_delay(Duration::from_millis(*ms)),
            None => adapter,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct StaticAdapter {
    hits: Vec<SearchHit>,
    delay: Option<Duration>,
    failure: Option<String>,
}

impl StaticAdapter {
    pub fn new(hits: Vec<SearchHit>) -> Self {
        Self {
            hits,
            ..Default::default()
        }
    }

    /// Adapter whose every call fails with `message`
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            failure: Some(message.into()),
            ..Default::default()
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

#[async_trait::async_trait]
impl SearchAdapter for StaticAdapter {
    async fn search(&self, _query: &Query, top_k: usize) -> Result<Vec<SearchHit>> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(message) = &self.failure {
            return Err(PipelineError::source_unavailable("static", message.clone()));
        }
        Ok(self.hits.iter().take(top_k).cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixture_parsing() {
        let fixture = Fixture::from_json(
            r#"{
                "sources": {
                    "web": [{"url": "https://a.com", "title": "A", "rawScore": 0.8}],
                    "vector": [{"id": "doc-1", "raw_score": 0.4}]
                },
                "latency_ms": {"web": 20}
            }"#,
        )
        .unwrap();

        assert_eq!(fixture.sources["web"][0].raw_score, 0.8);
        assert_eq!(fixture.sources["vector"][0].id.as_deref(), Some("doc-1"));
        assert_eq!(fixture.latency_ms["web"], 20);
        assert!(Fixture::from_json("{not json").is_err());
    }

    #[tokio::test]
    async fn test_static_adapter_truncates() {
        let adapter = StaticAdapter::new(vec![
            SearchHit::with_id("1", "one", 0.9),
            SearchHit::with_id("2", "two", 0.8),
            SearchHit::with_id("3", "three", 0.7),
        ]);
        let hits = adapter.search(&Query::new("q"), 2).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[1].id.as_deref(), Some("2"));
    }

    #[tokio::test]
    async fn test_missing_source_is_empty() {
        let adapter = Fixture::default().adapter("knowledge_graph");
        assert!(adapter.search(&Query::new("q"), 5).await.unwrap().is_empty());
    }
}
