//! Lexical bi-encoder stand-in
//!
//! Scores a passage by the share of distinct query terms it contains.
//! Cheap enough to run without a permit, so it serves as the fallback
//! when the cross-encoder pool is saturated.

use std::collections::HashSet;

use fusegate_common::Result;

use super::InferenceScorer;

#[derive(Debug, Default)]
pub struct TokenOverlapScorer;

fn terms(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

#[async_trait::async_trait]
impl InferenceScorer for TokenOverlapScorer {
    fn name(&self) -> &str {
        "token_overlap"
    }

    async fn score(&self, query: &str, passage: &str) -> Result<f64> {
        let query_terms = terms(query);
        if query_terms.is_empty() {
            return Ok(0.0);
        }
        let passage_terms = terms(passage);
        let shared = query_terms.intersection(&passage_terms).count();
        Ok(shared as f64 / query_terms.len() as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_overlap_share() {
        let scorer = TokenOverlapScorer;
        let full = scorer.score("tokio runtime", "The Tokio runtime explained").await.unwrap();
        let half = scorer.score("tokio runtime", "async-std vs tokio").await.unwrap();
        let none = scorer.score("tokio runtime", "serde derive").await.unwrap();
        assert_eq!(full, 1.0);
        assert_eq!(half, 0.5);
        assert_eq!(none, 0.0);
        assert_eq!(scorer.score("", "anything").await.unwrap(), 0.0);
    }

    #[tokio::test]
    async fn test_hangul_terms() {
        let scorer = TokenOverlapScorer;
        let s = scorer.score("환율 정책", "환율 정책 변화 요약").await.unwrap();
        assert_eq!(s, 1.0);
    }
}
