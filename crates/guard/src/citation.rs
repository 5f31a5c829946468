//! Citation gate
//!
//! Counts distinct trusted hosts among evidence URLs and enforces a floor:
//! - `min` by default
//! - one more when the question is novel
//! - at least `min_expanded_mode` outside SAFE mode
//!
//! Also checks host diversity, and offers helpers for answer text that
//! lacks any citation marker.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use fusegate_common::config::CitationConfig;
use fusegate_common::EvidenceItem;
use regex_lite::Regex;

use crate::{Gate, GateContext, GateVerdict};

/// Inline markers such as `[W1]`, `[V2]`, `[D3]`, `[4]`
static CITATION_MARKER: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"\[(?:W\d+|V\d+|D\d+|\d+)\]").ok());

pub struct CitationGate {
    config: CitationConfig,
}

impl CitationGate {
    pub fn new(config: CitationConfig) -> Self {
        Self { config }
    }

    /// Citation floor for this request
    pub fn required(&self, ctx: &GateContext) -> usize {
        let mut floor = self.config.min;
        if ctx.novelty_score > self.config.novelty_threshold {
            floor += 1;
        }
        if ctx.mode.is_expanded() {
            floor = floor.max(self.config.min_expanded_mode);
        }
        floor
    }

    fn is_trusted(&self, host: &str) -> bool {
        self.config.trusted_hosts.is_empty()
            || self.config.trusted_hosts.iter().any(|t| {
                let t = t.trim().trim_start_matches("www.").to_lowercase();
                host == t || host.ends_with(&format!(".{}", t))
            })
    }
}

impl Gate for CitationGate {
    fn name(&self) -> &'static str {
        "citation"
    }

    fn check(&self, evidence: &[EvidenceItem], ctx: &GateContext) -> GateVerdict {
        let hosts: BTreeSet<String> = evidence.iter().filter_map(EvidenceItem::host).collect();
        let trusted = hosts.iter().filter(|h| self.is_trusted(h)).count();
        let required = self.required(ctx);

        if trusted < required {
            return GateVerdict::block(format!(
                "trusted citations {} below floor {}",
                trusted, required
            ))
            .with_deficit(required - trusted);
        }

        if hosts.len() < self.config.host_diversity_min {
            return GateVerdict::block(format!(
                "distinct hosts {} below diversity floor {}",
                hosts.len(),
                self.config.host_diversity_min
            ))
            .with_deficit(self.config.host_diversity_min - hosts.len());
        }

        GateVerdict::pass(format!("{} trusted citations (floor {})", trusted, required))
    }
}

/// Whether answer text carries a URL, a citation marker or a source line
pub fn has_citation(text: &str) -> bool {
    if text.contains("http://") || text.contains("https://") {
        return true;
    }
    if CITATION_MARKER.as_ref().is_some_and(|re| re.is_match(text)) {
        return true;
    }
    let lower = text.to_lowercase();
    lower.contains("출처:") || lower.contains("source:")
}

/// Append the top evidence URL when the answer cites nothing
pub fn append_top_citation(text: &str, evidence: &[EvidenceItem]) -> String {
    if has_citation(text) {
        return text.to_string();
    }

    match evidence.iter().min_by_key(|e| e.rank).and_then(|e| e.url.as_deref()) {
        Some(url) => format!("{}\n\nSource: {}", text.trim_end(), url),
        None => text.to_string(),
    }
}
