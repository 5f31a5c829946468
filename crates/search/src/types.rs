//! Raw hits as returned by source adapters

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One item returned by a search adapter
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SearchHit {
    /// Explicit identifier, when the backend has one
    #[serde(default)]
    pub id: Option<String>,

    /// Source URL
    #[serde(default)]
    pub url: Option<String>,

    #[serde(default)]
    pub title: String,

    #[serde(default)]
    pub snippet: String,

    /// Backend relevance score on its native scale
    #[serde(alias = "rawScore")]
    pub raw_score: f64,
}

impl SearchHit {
    pub fn with_url(url: impl Into<String>, title: impl Into<String>, raw_score: f64) -> Self {
        Self {
            url: Some(url.into()),
            title: title.into(),
            raw_score,
            ..Default::default()
        }
    }

    pub fn with_id(id: impl Into<String>, title: impl Into<String>, raw_score: f64) -> Self {
        Self {
            id: Some(id.into()),
            title: title.into(),
            raw_score,
            ..Default::default()
        }
    }

    pub fn snippet(mut self, snippet: impl Into<String>) -> Self {
        self.snippet = snippet.into();
        self
    }
}

/// A hit with its 1-based rank in the adapter's ordering
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RankedHit {
    pub hit: SearchHit,
    pub rank: usize,
}

/// Per-source ordered hits, keyed by source name
pub type SourceResults = BTreeMap<String, Vec<RankedHit>>;

/// Attach 1-based ranks in adapter order
pub fn rank_hits(hits: Vec<SearchHit>) -> Vec<RankedHit> {
    hits.into_iter()
        .enumerate()
        .map(|(i, hit)| RankedHit { hit, rank: i + 1 })
        .collect()
}
