//! Calibrated rank fusion
//!
//! Merges per-source hit lists into one ranked evidence set:
//! - hits are canonicalized so URL variants and repeated ids collapse
//! - each source is re-ordered by calibrated score and contributes
//!   weighted RRF `w / (k + rank)` to every key it returned
//! - the calibrated scores of a key are combined by power mean, lifted
//!   toward their tail mean and calibrated once more as the "fused" source,
//!   rescaled by the share of queried sources that returned the key
//! - ties break on the canonical key so ordering is deterministic

pub mod aggregate;
pub mod canonical;

pub use canonical::{canonical_key, content_hash, normalize_url};

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use fusegate_common::config::FusionConfig;
use fusegate_common::EvidenceItem;
use tracing::debug;

use crate::calibration::ScoreCalibrator;
use crate::types::{SearchHit, SourceResults};
use aggregate::{boost, power_mean, tail_mean};

/// Calibration source applied to boosted aggregates
pub const FUSED_SOURCE: &str = "fused";

/// Evidence accumulated for one canonical key
struct Accumulator {
    rrf: f64,
    /// `(source weight, calibrated score)` per contribution
    contributions: Vec<(f64, f64)>,
    sources: Vec<String>,
    representative: SearchHit,
    representative_source: String,
    representative_calibrated: f64,
}

pub struct RankFusionEngine {
    config: FusionConfig,
    source_weights: HashMap<String, f64>,
    calibrator: Arc<ScoreCalibrator>,
}

impl RankFusionEngine {
    pub fn new(
        config: FusionConfig,
        source_weights: HashMap<String, f64>,
        calibrator: Arc<ScoreCalibrator>,
    ) -> Self {
        Self {
            config,
            source_weights,
            calibrator,
        }
    }

    /// Weight of `source` under a routing profile
    ///
    /// Profile overrides win over the per-source weight; unknown sources get 1.0.
    pub fn weight(&self, source: &str, profile: &str) -> f64 {
        self.config
            .profiles
            .get(profile)
            .and_then(|weights| weights.get(source))
            .or_else(|| self.source_weights.get(source))
            .copied()
            .unwrap_or(1.0)
    }

    /// Weighted RRF contribution for a 1-based rank
    pub fn rrf(&self, weight: f64, rank: usize) -> f64 {
        weight / (self.config.rrf_k + rank as f64)
    }

    /// Fuse per-source results into ranked evidence
    pub fn fuse(&self, results: &SourceResults, profile: &str) -> Vec<EvidenceItem> {
        let mut merged: BTreeMap<String, Accumulator> = BTreeMap::new();

        for (source, hits) in results {
            let weight = self.weight(source, profile);

            let mut calibrated: Vec<(f64, usize, &SearchHit)> = hits
                .iter()
                .map(|h| (self.calibrator.calibrate(source, h.hit.raw_score), h.rank, &h.hit))
                .collect();
            calibrated.sort_by(|a, b| b.0.total_cmp(&a.0).then(a.1.cmp(&b.1)));

            for (position, (score, _, hit)) in calibrated.into_iter().enumerate() {
                let contribution = self.rrf(weight, position + 1);
                let key = canonical_key(hit);

                match merged.get_mut(&key) {
                    Some(acc) => {
                        acc.rrf += contribution;
                        acc.contributions.push((weight, score));
                        if !acc.sources.iter().any(|s| s == source) {
                            acc.sources.push(source.clone());
                        }
                        if hit.raw_score > acc.representative.raw_score {
                            acc.representative = hit.clone();
                            acc.representative_source = source.clone();
                            acc.representative_calibrated = score;
                        }
                    }
                    None => {
                        merged.insert(
                            key,
                            Accumulator {
                                rrf: contribution,
                                contributions: vec![(weight, score)],
                                sources: vec![source.clone()],
                                representative: hit.clone(),
                                representative_source: source.clone(),
                                representative_calibrated: score,
                            },
                        );
                    }
                }
            }
        }

        let queried = results.len();
        let mut evidence: Vec<EvidenceItem> = merged
            .into_iter()
            .map(|(key, acc)| self.finish(key, acc, queried))
            .collect();

        evidence.sort_by(|a, b| {
            b.fused_score
                .total_cmp(&a.fused_score)
                .then_with(|| a.canonical_key.cmp(&b.canonical_key))
        });
        for (i, item) in evidence.iter_mut().enumerate() {
            item.rank = i + 1;
        }

        debug!(
            sources = results.len(),
            fused = evidence.len(),
            profile,
            "Fusion completed"
        );
        evidence
    }

    fn finish(&self, key: String, acc: Accumulator, queried: usize) -> EvidenceItem {
        let scores: Vec<f64> = acc.contributions.iter().map(|(_, s)| *s).collect();
        let pm = power_mean(&acc.contributions, self.config.power_mean_p);
        let tm = tail_mean(&scores, self.config.tail_alpha);
        let coverage = acc.sources.len() as f64 / queried.max(1) as f64;
        let boosted = self
            .calibrator
            .calibrate_with_coverage(FUSED_SOURCE, boost(pm, tm), coverage);

        EvidenceItem {
            canonical_key: key,
            title: acc.representative.title,
            snippet: acc.representative.snippet,
            url: acc.representative.url,
            source: acc.representative_source,
            raw_score: acc.representative.raw_score,
            calibrated_score: acc.representative_calibrated,
            fused_score: acc.rrf + boosted,
            rank: 0,
            contributing_sources: acc.sources,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::rank_hits;
    use fusegate_common::config::{AppConfig, CalibrationConfig, CoverageConfig};

    fn engine() -> RankFusionEngine {
        let config = AppConfig::default();
        RankFusionEngine::new(
            config.fusion.clone(),
            config.source_weights(),
            Arc::new(ScoreCalibrator::new(CalibrationConfig::default())),
        )
    }

    fn results(entries: Vec<(&str, Vec<SearchHit>)>) -> SourceResults {
        entries
            .into_iter()
            .map(|(name, hits)| (name.to_string(), rank_hits(hits)))
            .collect()
    }

    #[test]
    fn test_rrf_strictly_decreasing_in_rank() {
        let engine = engine();
        let mut prev = f64::INFINITY;
        for rank in 1..200 {
            let c = engine.rrf(1.0, rank);
            assert!(c < prev);
            prev = c;
        }
        assert!((engine.rrf(1.0, 1) - 1.0 / 61.0).abs() < 1e-12);
    }

    #[test]
    fn test_utm_variants_fuse_into_one_item() {
        let engine = engine();
        let input = results(vec![(
            "web",
            vec![
                SearchHit::with_url("https://news.example.com/a?utm_source=feed", "A feed", 0.7),
                SearchHit::with_url("https://news.example.com/a", "A canonical", 0.9),
                SearchHit::with_url("https://other.org/b", "B", 0.5),
            ],
        )]);

        let fused = engine.fuse(&input, "default");
        assert_eq!(fused.len(), 2);

        let a = fused.iter().find(|e| e.canonical_key == "url:news.example.com/a").unwrap();
        assert_eq!(a.title, "A canonical");
        assert_eq!(a.raw_score, 0.9);

        let max_single = engine.rrf(engine.weight("web", "default"), 1);
        assert!(a.fused_score >= max_single);
        assert_eq!(a.rank, 1);
    }

    #[test]
    fn test_cross_source_agreement_ranks_first() {
        let engine = engine();
        let input = results(vec![
            (
                "vector",
                vec![
                    SearchHit::with_id("a", "A", 0.9),
                    SearchHit::with_id("b", "B", 0.8),
                    SearchHit::with_id("c", "C", 0.7),
                ],
            ),
            (
                "knowledge_graph",
                vec![
                    SearchHit::with_id("b", "B", 0.9),
                    SearchHit::with_id("a", "A", 0.7),
                    SearchHit::with_id("d", "D", 0.6),
                ],
            ),
        ]);

        let fused = engine.fuse(&input, "default");
        assert_eq!(fused.len(), 4);
        let top: Vec<&str> = fused.iter().take(2).map(|e| e.canonical_key.as_str()).collect();
        assert!(top.contains(&"id:a") && top.contains(&"id:b"));
        assert_eq!(fused[0].contributing_sources.len(), 2);
        assert!(fused.windows(2).all(|w| w[0].fused_score >= w[1].fused_score));
        assert_eq!(fused.iter().map(|e| e.rank).collect::<Vec<_>>(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_ties_break_on_key() {
        let engine = engine();
        let input = results(vec![
            ("vector", vec![SearchHit::with_id("zeta", "Z", 0.6)]),
            ("web", vec![SearchHit::with_id("alpha", "A", 0.6)]),
        ]);
        // Equal weights via a profile so both contributions match exactly
        let mut config = AppConfig::default().fusion;
        config.profiles.insert(
            "flat".into(),
            [("vector".to_string(), 1.0), ("web".to_string(), 1.0)].into_iter().collect(),
        );
        let mut calibration = CalibrationConfig::default();
        calibration.sources.remove("vector");
        calibration.sources.remove("web");
        let engine = RankFusionEngine::new(
            config,
            engine.source_weights.clone(),
            Arc::new(ScoreCalibrator::new(calibration)),
        );

        let fused = engine.fuse(&input, "flat");
        assert_eq!(fused[0].fused_score, fused[1].fused_score);
        assert_eq!(fused[0].canonical_key, "id:alpha");
    }

    #[test]
    fn test_domain_strict_profile_weights() {
        let engine = engine();
        assert_eq!(engine.weight("knowledge_graph", "domain_strict"), 1.2);
        assert_eq!(engine.weight("web", "domain_strict"), 0.5);
        assert_eq!(engine.weight("web", "default"), 1.0);
        assert_eq!(engine.weight("unknown", "default"), 1.0);
    }

    #[test]
    fn test_output_independent_of_source_listing() {
        let engine = engine();
        let a = results(vec![
            ("web", vec![SearchHit::with_url("https://x.com/1", "X", 0.8)]),
            ("vector", vec![SearchHit::with_id("y", "Y", 0.8)]),
        ]);
        let b = results(vec![
            ("vector", vec![SearchHit::with_id("y", "Y", 0.8)]),
            ("web", vec![SearchHit::with_url("https://x.com/1", "X", 0.8)]),
        ]);
        assert_eq!(engine.fuse(&a, "default"), engine.fuse(&b, "default"));
    }

    #[test]
    fn test_coverage_rewards_multi_source_keys() {
        let input = results(vec![
            (
                "vector",
                vec![SearchHit::with_id("shared", "S", 0.7), SearchHit::with_id("solo", "O", 0.7)],
            ),
            ("knowledge_graph", vec![SearchHit::with_id("shared", "S", 0.7)]),
        ]);

        // One stats table for every source so both keys boost to the same value
        let fuse_with = |coverage: Option<CoverageConfig>| {
            let mut calibration = CalibrationConfig::default();
            calibration.sources.retain(|name, _| name == FUSED_SOURCE);
            calibration.coverage = coverage;
            let base = engine();
            RankFusionEngine::new(
                base.config,
                base.source_weights,
                Arc::new(ScoreCalibrator::new(calibration)),
            )
            .fuse(&input, "default")
        };
        let score = |items: &[EvidenceItem], key: &str| {
            items.iter().find(|e| e.canonical_key == key).unwrap().fused_score
        };

        let plain = fuse_with(None);
        let covered = fuse_with(Some(CoverageConfig {
            gamma: 2.0,
            lambda: 0.5,
        }));

        for key in ["id:shared", "id:solo"] {
            assert!(score(&covered, key) < score(&plain, key));
        }
        // Half coverage loses more of the boosted term than full coverage
        let shared_drop = score(&plain, "id:shared") - score(&covered, "id:shared");
        let solo_drop = score(&plain, "id:solo") - score(&covered, "id:solo");
        assert!(solo_drop > shared_drop);
        assert_eq!(covered[0].canonical_key, "id:shared");
    }

    #[test]
    fn test_empty_input() {
        assert!(engine().fuse(&SourceResults::new(), "default").is_empty());
    }
}
