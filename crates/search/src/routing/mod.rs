//! Query complexity routing
//!
//! Classifies a query from cheap lexical features and turns the class into
//! typed retrieval hints:
//! - how many web and vector hits to fetch
//! - whether to rerank and run the second (knowledge graph) pass
//! - which fusion weight profile to use

mod features;

pub use features::QueryFeatures;

use fusegate_common::config::ComplexityConfig;
use fusegate_common::Query;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Token count above which a query is complex regardless of keywords
const LONG_QUERY_TOKENS: usize = 14;

/// Entity count at which a query becomes domain specific
const DOMAIN_ENTITY_MIN: usize = 3;

/// Weight profile name for domain-specific queries
pub const DOMAIN_STRICT_PROFILE: &str = "domain_strict";

pub const DEFAULT_PROFILE: &str = "default";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QueryTag {
    Simple,
    Complex,
    WebRequired,
    DomainSpecific,
}

impl QueryTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryTag::Simple => "simple",
            QueryTag::Complex => "complex",
            QueryTag::WebRequired => "web_required",
            QueryTag::DomainSpecific => "domain_specific",
        }
    }
}

/// Classification result
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct QueryProfile {
    pub tag: QueryTag,
    /// Weighted complexity score in [0, 1]
    pub score: f64,
    pub features: QueryFeatures,
}

/// Per-query retrieval plan
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RoutingHints {
    pub web_top_k: usize,
    pub vector_top_k: usize,
    pub use_cross_encoder: bool,
    pub enable_second_pass: bool,
    pub enable_web: bool,
    pub routing_profile: String,
}

pub struct ComplexityRouter {
    config: ComplexityConfig,
}

impl ComplexityRouter {
    pub fn new(config: ComplexityConfig) -> Self {
        Self { config }
    }

    /// Features, score and tag for a query
    pub fn profile(&self, query: &Query) -> QueryProfile {
        let features = QueryFeatures::extract(&query.text);

        let tag = if features.has_web_keyword {
            QueryTag::WebRequired
        } else if features.has_complex_keyword || features.token_count >= LONG_QUERY_TOKENS {
            QueryTag::Complex
        } else if features.entity_count >= DOMAIN_ENTITY_MIN {
            QueryTag::DomainSpecific
        } else {
            QueryTag::Simple
        };

        QueryProfile {
            tag,
            score: features.score(),
            features,
        }
    }

    pub fn classify(&self, query: &Query) -> QueryTag {
        self.profile(query).tag
    }

    /// Hints for a tag; a fixed plan when routing is disabled
    pub fn decide(&self, tag: QueryTag) -> RoutingHints {
        let web = self.config.default_web_top_k;
        let vector = self.config.default_vector_top_k;

        if !self.config.enabled {
            return RoutingHints {
                web_top_k: web,
                vector_top_k: vector,
                use_cross_encoder: true,
                enable_second_pass: true,
                enable_web: true,
                routing_profile: DEFAULT_PROFILE.to_string(),
            };
        }

        match tag {
            QueryTag::Simple => RoutingHints {
                web_top_k: 0,
                vector_top_k: vector.min(8),
                use_cross_encoder: false,
                enable_second_pass: false,
                enable_web: false,
                routing_profile: DEFAULT_PROFILE.to_string(),
            },
            QueryTag::Complex => RoutingHints {
                web_top_k: web.min(5),
                vector_top_k: vector.max(10),
                use_cross_encoder: true,
                enable_second_pass: true,
                enable_web: self.config.complex_enable_web,
                routing_profile: DEFAULT_PROFILE.to_string(),
            },
            QueryTag::WebRequired => RoutingHints {
                web_top_k: web.max(5),
                vector_top_k: vector.max(12),
                use_cross_encoder: true,
                enable_second_pass: true,
                enable_web: true,
                routing_profile: DEFAULT_PROFILE.to_string(),
            },
            QueryTag::DomainSpecific => RoutingHints {
                web_top_k: 0,
                vector_top_k: vector.max(12),
                use_cross_encoder: true,
                enable_second_pass: true,
                enable_web: false,
                routing_profile: DOMAIN_STRICT_PROFILE.to_string(),
            },
        }
    }

    /// Classify and plan in one step
    pub fn route(&self, query: &Query) -> (QueryProfile, RoutingHints) {
        let profile = self.profile(query);
        let hints = self.decide(profile.tag);

        debug!(
            request_id = %query.request_id,
            tag = profile.tag.as_str(),
            score = profile.score,
            web_top_k = hints.web_top_k,
            vector_top_k = hints.vector_top_k,
            "Query routed"
        );

        (profile, hints)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn router() -> ComplexityRouter {
        ComplexityRouter::new(ComplexityConfig::default())
    }

    #[test]
    fn test_korean_recency_query_needs_web() {
        let (profile, hints) = router().route(&Query::new("최신 환율 정책 변화"));
        assert_eq!(profile.tag, QueryTag::WebRequired);
        assert!(hints.web_top_k >= 5);
        assert!(hints.vector_top_k >= 12);
        assert!(hints.use_cross_encoder);
        assert!(hints.enable_web);
    }

    #[test]
    fn test_simple_query() {
        let (profile, hints) = router().route(&Query::new("tokio semaphore"));
        assert_eq!(profile.tag, QueryTag::Simple);
        assert_eq!(hints.web_top_k, 0);
        assert_eq!(hints.vector_top_k, 8);
        assert!(!hints.use_cross_encoder);
        assert!(!hints.enable_second_pass);
    }

    #[test]
    fn test_complex_by_keyword_and_length() {
        let comparison = Query::new("difference between mutex and rwlock");
        assert_eq!(router().classify(&comparison), QueryTag::Complex);
        assert_eq!(router().classify(&Query::new("Rust 와 Go 의 차이")), QueryTag::Complex);

        let long = "a b c d e f g h i j k l m n";
        assert_eq!(router().classify(&Query::new(long)), QueryTag::Complex);
    }

    #[test]
    fn test_domain_specific_uses_strict_profile() {
        let router = router();
        let query = Query::new("Supreme Court ruling on Fair Labor Standards Act and New Deal");
        assert_eq!(router.classify(&query), QueryTag::DomainSpecific);

        let hints = router.decide(QueryTag::DomainSpecific);
        assert_eq!(hints.routing_profile, DOMAIN_STRICT_PROFILE);
        assert!(!hints.enable_web);
        assert_eq!(hints.vector_top_k, 12);
    }

    #[test]
    fn test_web_keyword_wins_over_complex() {
        let tag = router().classify(&Query::new("latest difference between versions"));
        assert_eq!(tag, QueryTag::WebRequired);
    }

    #[test]
    fn test_disabled_router_returns_fixed_hints() {
        let config = ComplexityConfig {
            enabled: false,
            ..ComplexityConfig::default()
        };
        let router = ComplexityRouter::new(config);
        for tag in [QueryTag::Simple, QueryTag::Complex, QueryTag::DomainSpecific] {
            let hints = router.decide(tag);
            assert_eq!(hints.web_top_k, 8);
            assert_eq!(hints.vector_top_k, 10);
            assert!(hints.use_cross_encoder && hints.enable_second_pass && hints.enable_web);
            assert_eq!(hints.routing_profile, DEFAULT_PROFILE);
        }
    }

    #[test]
    fn test_complex_web_follows_config() {
        let config = ComplexityConfig {
            complex_enable_web: false,
            ..ComplexityConfig::default()
        };
        let hints = ComplexityRouter::new(config).decide(QueryTag::Complex);
        assert!(!hints.enable_web);
        assert_eq!(hints.web_top_k, 5);
    }
}
