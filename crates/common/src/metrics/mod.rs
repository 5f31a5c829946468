//! Metrics and observability utilities
//!
//! Provides Prometheus metrics with SLO-aligned histograms
//! and standardized naming conventions.

use metrics::{
    counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit,
};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::Instant;

/// Metrics prefix for all FuseGate metrics
pub const METRICS_PREFIX: &str = "fusegate";

/// SLO-aligned histogram buckets for pipeline latency (in seconds)
/// Targets: P50 < 250ms, P99 < 1.5s
pub const LATENCY_BUCKETS: &[f64] = &[
    0.010,  // 10ms
    0.025,  // 25ms
    0.050,  // 50ms
    0.100,  // 100ms
    0.250,  // 250ms - P50 target
    0.500,  // 500ms
    0.750,  // 750ms
    1.000,  // 1s
    1.500,  // 1.5s - P99 target
    2.500,  // 2.5s
    5.000,  // 5s
];

/// Outcome label for a single source call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceOutcome {
    Ok,
    Timeout,
    Error,
    Saturated,
}

impl SourceOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceOutcome::Ok => "ok",
            SourceOutcome::Timeout => "timeout",
            SourceOutcome::Error => "error",
            SourceOutcome::Saturated => "saturated",
        }
    }
}

/// Register all metric descriptions
pub fn register_metrics() {
    // Retrieval metrics
    describe_counter!(
        format!("{}_retrieval_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Source calls by outcome"
    );

    describe_histogram!(
        format!("{}_retrieval_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Per-source retrieval latency in seconds"
    );

    describe_gauge!(
        format!("{}_retrieval_hits", METRICS_PREFIX),
        Unit::Count,
        "Hits returned by the last call to a source"
    );

    describe_counter!(
        format!("{}_retrieval_hedges_total", METRICS_PREFIX),
        Unit::Count,
        "Hedged duplicate requests launched"
    );

    // Coalescing metrics
    describe_counter!(
        format!("{}_coalesce_total", METRICS_PREFIX),
        Unit::Count,
        "Coalesced calls by role (leader, joined, uncoalesced)"
    );

    // Rerank metrics
    describe_counter!(
        format!("{}_rerank_total", METRICS_PREFIX),
        Unit::Count,
        "Rerank invocations by strategy"
    );

    describe_counter!(
        format!("{}_rerank_item_failures_total", METRICS_PREFIX),
        Unit::Count,
        "Per-candidate scoring failures"
    );

    // Gate metrics
    describe_counter!(
        format!("{}_gate_decisions_total", METRICS_PREFIX),
        Unit::Count,
        "Gate decisions by gate and outcome"
    );

    // Pipeline metrics
    describe_counter!(
        format!("{}_pipeline_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Pipeline runs by routing tag and outcome"
    );

    describe_histogram!(
        format!("{}_pipeline_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "End-to-end pipeline latency in seconds"
    );

    tracing::info!("Metrics registered");
}

/// Install the Prometheus exporter on the given port (0 disables it)
pub fn install_exporter(port: u16) -> Result<(), String> {
    if port == 0 {
        return Ok(());
    }

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .set_buckets(LATENCY_BUCKETS)
        .map_err(|e| format!("Invalid histogram buckets: {}", e))?
        .install()
        .map_err(|e| format!("Failed to install Prometheus exporter: {}", e))?;

    tracing::info!(port, "Prometheus exporter listening");
    Ok(())
}

/// Helper to record pipeline metrics
pub struct PipelineMetrics {
    start: Instant,
    tag: String,
}

impl PipelineMetrics {
    /// Start tracking a pipeline run
    pub fn start(tag: &str) -> Self {
        Self {
            start: Instant::now(),
            tag: tag.to_string(),
        }
    }

    /// Record pipeline completion
    pub fn finish(self, outcome: &str) {
        let duration = self.start.elapsed().as_secs_f64();

        counter!(
            format!("{}_pipeline_requests_total", METRICS_PREFIX),
            "tag" => self.tag.clone(),
            "outcome" => outcome.to_string()
        )
        .increment(1);

        histogram!(
            format!("{}_pipeline_duration_seconds", METRICS_PREFIX),
            "tag" => self.tag
        )
        .record(duration);
    }
}

/// Helper to record a source call
pub fn record_retrieval(source: &str, outcome: SourceOutcome, duration_secs: f64, hits: usize) {
    counter!(
        format!("{}_retrieval_requests_total", METRICS_PREFIX),
        "source" => source.to_string(),
        "outcome" => outcome.as_str()
    )
    .increment(1);

    histogram!(
        format!("{}_retrieval_duration_seconds", METRICS_PREFIX),
        "source" => source.to_string()
    )
    .record(duration_secs);

    gauge!(
        format!("{}_retrieval_hits", METRICS_PREFIX),
        "source" => source.to_string()
    )
    .set(hits as f64);
}

/// Helper to record a hedged request launch
pub fn record_hedge(source: &str) {
    counter!(
        format!("{}_retrieval_hedges_total", METRICS_PREFIX),
        "source" => source.to_string()
    )
    .increment(1);
}

/// Helper to record coalescer roles
pub fn record_coalesce(role: &'static str) {
    counter!(
        format!("{}_coalesce_total", METRICS_PREFIX),
        "role" => role
    )
    .increment(1);
}

/// Helper to record rerank metrics
pub fn record_rerank(strategy: &'static str, item_failures: usize) {
    counter!(
        format!("{}_rerank_total", METRICS_PREFIX),
        "strategy" => strategy
    )
    .increment(1);

    if item_failures > 0 {
        counter!(format!("{}_rerank_item_failures_total", METRICS_PREFIX))
            .increment(item_failures as u64);
    }
}

/// Helper to record gate decisions
pub fn record_gate(gate: &str, decision: &'static str) {
    counter!(
        format!("{}_gate_decisions_total", METRICS_PREFIX),
        "gate" => gate.to_string(),
        "decision" => decision
    )
    .increment(1);
}
