//! End-to-end evidence pipeline
//!
//! Query in, gated evidence out:
//! - route the query into retrieval hints
//! - fan out to the enabled sources
//! - fuse with the routed profile weights
//! - rerank under the request time budget when routing asks for it
//! - derive risk signals from the evidence and run the gate chain
//!
//! A BLOCK from the chain is surfaced as `PipelineError::GateRejected`.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use fusegate_common::metrics::PipelineMetrics;
use fusegate_common::{AppConfig, EvidenceItem, PipelineError, Query, Result};
use fusegate_guard::{GateContext, GateReport, QualityGateChain};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::calibration::ScoreCalibrator;
use crate::fusion::RankFusionEngine;
use crate::rerank::{CrossEncoderReranker, RerankStrategy, TimeBudget};
use crate::retrieval::RetrievalCoordinator;
use crate::routing::{ComplexityRouter, QueryProfile, RoutingHints};

/// Everything a caller needs from one pipeline run
#[derive(Debug, Clone, Serialize)]
pub struct PipelineOutput {
    pub request_id: Uuid,
    pub query_profile: QueryProfile,
    pub hints: RoutingHints,
    /// Final ranked, sanitized evidence
    pub evidence: Vec<EvidenceItem>,
    pub gate_report: GateReport,
    pub rerank_strategy: RerankStrategy,
    /// Hits returned per source before fusion
    pub source_hits: BTreeMap<String, usize>,
}

pub struct EvidencePipeline {
    config: AppConfig,
    router: ComplexityRouter,
    coordinator: RetrievalCoordinator,
    calibrator: Arc<ScoreCalibrator>,
    fusion: RankFusionEngine,
    reranker: CrossEncoderReranker,
    gates: QualityGateChain,
}

impl EvidencePipeline {
    pub fn new(
        config: AppConfig,
        coordinator: RetrievalCoordinator,
        reranker: CrossEncoderReranker,
    ) -> Self {
        let calibrator = Arc::new(ScoreCalibrator::new(config.calibration.clone()));
        let source_weights = config.source_weights();

        Self {
            router: ComplexityRouter::new(config.complexity.clone()),
            fusion: RankFusionEngine::new(
                config.fusion.clone(),
                source_weights,
                calibrator.clone(),
            ),
            gates: QualityGateChain::from_config(&config),
            calibrator,
            coordinator,
            reranker,
            config,
        }
    }

    /// Shared calibrator, for hot-reloading source statistics
    pub fn calibrator(&self) -> &Arc<ScoreCalibrator> {
        &self.calibrator
    }

    pub fn reranker(&self) -> &CrossEncoderReranker {
        &self.reranker
    }

    /// Run one query through routing, retrieval, fusion, reranking and gating
    pub async fn run(
        &self,
        query: &Query,
        mut ctx: GateContext,
        budget: Duration,
    ) -> Result<PipelineOutput> {
        let budget = TimeBudget::new(budget);
        query.check()?;

        let (profile, hints) = self.router.route(query);
        let metrics = PipelineMetrics::start(profile.tag.as_str());

        let results = self.coordinator.retrieve(query, &hints).await;
        let source_hits: BTreeMap<String, usize> = results
            .iter()
            .map(|(source, hits)| (source.clone(), hits.len()))
            .collect();

        let fused = self.fusion.fuse(&results, &hints.routing_profile);
        let final_k = self.config.cross_encoder.final_k;

        let (evidence, rerank_strategy) = if hints.use_cross_encoder {
            let outcome = self.reranker.rerank(&query.text, fused, final_k, &budget).await;
            (outcome.items, outcome.strategy)
        } else {
            let mut items = fused;
            items.truncate(final_k);
            (items, RerankStrategy::Skipped)
        };

        let top_calibrated = evidence.iter().map(|e| e.calibrated_score).reduce(f64::max);
        if let Some(top) = top_calibrated {
            ctx.risk.has_strong_evidence |= top >= self.config.gate.strong_evidence_floor;
            ctx.risk.calibrated_probability = ctx.risk.calibrated_probability.or(Some(top));
        }

        let mut gate_report = self.gates.run(evidence, &ctx);
        let evidence = std::mem::take(&mut gate_report.evidence);

        if gate_report.is_blocked() {
            metrics.finish("blocked");
            let gate = gate_report.decided_by.unwrap_or("unknown");
            warn!(
                request_id = %query.request_id,
                gate,
                reason = %gate_report.reason,
                "Evidence rejected"
            );
            return Err(PipelineError::GateRejected {
                gate: gate.to_string(),
                reason: gate_report.reason,
            });
        }

        metrics.finish(gate_report.decision.as_str());
        info!(
            request_id = %query.request_id,
            tag = profile.tag.as_str(),
            evidence = evidence.len(),
            rerank = rerank_strategy.as_str(),
            decision = gate_report.decision.as_str(),
            "Pipeline completed"
        );

        Ok(PipelineOutput {
            request_id: query.request_id,
            query_profile: profile,
            hints,
            evidence,
            gate_report,
            rerank_strategy,
            source_hits,
        })
    }
}
