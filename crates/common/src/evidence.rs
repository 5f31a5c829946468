//! Request-scoped data shared by the retrieval and guard crates

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use url::Url;
use uuid::Uuid;
use validator::Validate;

/// Maximum accepted query length in characters
pub const MAX_QUERY_CHARS: u64 = 2000;

/// User query entering the pipeline
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct Query {
    /// Request ID for log correlation
    pub request_id: Uuid,

    /// Query text
    #[validate(length(min = 1, max = 2000))]
    pub text: String,

    /// Locale tag (e.g. "ko-KR", "en-US")
    #[serde(default = "default_locale")]
    pub locale: String,

    /// Optional session/context values supplied by the caller
    #[serde(default)]
    pub context: HashMap<String, String>,
}

fn default_locale() -> String { "en-US".to_string() }

impl Query {
    /// Create a query with a fresh request ID and default locale
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            text: text.into(),
            locale: default_locale(),
            context: HashMap::new(),
        }
    }

    /// Set the locale
    pub fn with_locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = locale.into();
        self
    }

    /// Whitespace-normalized, lowercased text used for coalescing keys
    pub fn normalized_text(&self) -> String {
        self.text
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase()
    }

    /// Validate the query, rejecting blank text
    pub fn check(&self) -> crate::Result<()> {
        self.validate()?;
        if self.text.trim().is_empty() {
            return Err(crate::PipelineError::InvalidQuery {
                message: "query text is blank".to_string(),
            });
        }
        Ok(())
    }
}

/// A fused, ranked piece of evidence
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EvidenceItem {
    /// Identity within one fusion pass
    pub canonical_key: String,

    /// Display title (from the highest raw-score representative)
    pub title: String,

    /// Display snippet
    pub snippet: String,

    /// Source URL, if the evidence has one
    pub url: Option<String>,

    /// Source of the representative hit
    pub source: String,

    /// Raw score of the representative hit
    pub raw_score: f64,

    /// Calibrated probability of the representative hit (0.0 - 1.0)
    pub calibrated_score: f64,

    /// Fused score (RRF sum plus calibrated boost, or reranker score)
    pub fused_score: f64,

    /// 1-based rank
    pub rank: usize,

    /// Every source that returned this evidence
    pub contributing_sources: Vec<String>,
}

impl EvidenceItem {
    /// Empty evidence with the given identity and source
    pub fn new(canonical_key: impl Into<String>, source: impl Into<String>) -> Self {
        let source = source.into();
        Self {
            canonical_key: canonical_key.into(),
            title: String::new(),
            snippet: String::new(),
            url: None,
            contributing_sources: vec![source.clone()],
            source,
            raw_score: 0.0,
            calibrated_score: 0.0,
            fused_score: 0.0,
            rank: 0,
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_text(mut self, title: impl Into<String>, snippet: impl Into<String>) -> Self {
        self.title = title.into();
        self.snippet = snippet.into();
        self
    }

    pub fn with_scores(mut self, calibrated_score: f64, fused_score: f64) -> Self {
        self.calibrated_score = calibrated_score;
        self.fused_score = fused_score;
        self
    }

    /// Hostname of the evidence URL, without a `www.` prefix
    pub fn host(&self) -> Option<String> {
        let raw = self.url.as_deref()?.trim();
        let parsed = Url::parse(raw).or_else(|_| Url::parse(&format!("https://{}", raw))).ok()?;
        let host = parsed.host_str()?.to_lowercase();
        let host = host.strip_prefix("www.").map(str::to_string).unwrap_or(host);
        (!host.is_empty()).then_some(host)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(url: Option<&str>) -> EvidenceItem {
        let item = EvidenceItem::new("k", "web").with_text("t", "s");
        match url {
            Some(url) => item.with_url(url),
            None => item,
        }
    }

    #[test]
    fn test_host_extraction() {
        let mixed_case = item(Some("https://www.Example.com/a?b=1"));
        assert_eq!(mixed_case.host().as_deref(), Some("example.com"));
        assert_eq!(item(Some("http://user@docs.rs:8080/x")).host().as_deref(), Some("docs.rs"));
        assert_eq!(item(Some("news.naver.com/article")).host().as_deref(), Some("news.naver.com"));
        assert_eq!(item(None).host(), None);
    }

    #[test]
    fn test_query_validation() {
        assert!(Query::new("최신 환율 정책 변화").check().is_ok());
        assert!(Query::new("").check().is_err());
        assert!(Query::new("   ").check().is_err());
        assert!(Query::new("x".repeat(MAX_QUERY_CHARS as usize + 1)).check().is_err());
    }

    #[test]
    fn test_normalized_text() {
        let q = Query::new("  Rust   Async\tRuntime ");
        assert_eq!(q.normalized_text(), "rust async runtime");
    }
}
