//! FuseGate probe
//!
//! Runs one query through the full pipeline against fixture-backed sources:
//! - sources and their hits come from the JSON file in `FUSEGATE_FIXTURE`
//! - answer domains come from `FUSEGATE_DOMAINS` (comma separated)
//! - the output is printed as JSON

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use fusegate_common::metrics::{install_exporter, register_metrics};
use fusegate_common::{init_tracing, AppConfig, Query, VERSION};
use fusegate_guard::GateContext;
use fusegate_search::rerank::TokenOverlapScorer;
use fusegate_search::{
    source_flight, CrossEncoderReranker, EvidencePipeline, Fixture, RetrievalCoordinator,
};
use tracing::{info, warn};

const DEFAULT_BUDGET: Duration = Duration::from_millis(2_000);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = AppConfig::load().context("Failed to load configuration")?;
    config.check()?;

    init_tracing(&config.observability);
    info!("Starting FuseGate probe v{}", VERSION);

    register_metrics();
    if let Err(e) = install_exporter(config.observability.metrics_port) {
        warn!(error = %e, "Metrics exporter disabled");
    }

    let text = std::env::args().skip(1).collect::<Vec<_>>().join(" ");
    if text.trim().is_empty() {
        bail!("usage: fusegate-probe <query>");
    }

    let fixture_path = std::env::var("FUSEGATE_FIXTURE").context("FUSEGATE_FIXTURE is not set")?;
    let fixture = Fixture::from_file(&fixture_path)?;

    let mut coordinator = RetrievalCoordinator::new();
    for source in &config.retrieval.sources {
        let adapter = Arc::new(fixture.adapter(&source.name));
        coordinator = coordinator.with_source(source.clone(), adapter);
    }
    if let Some(flight) = source_flight(&config.coalesce).await? {
        coordinator = coordinator.with_coalescer(flight);
    }
    info!(sources = ?coordinator.source_names(), fixture = %fixture_path, "Sources registered");

    let scorer = Arc::new(TokenOverlapScorer);
    let reranker = CrossEncoderReranker::new(config.cross_encoder.clone())
        .with_scorer(scorer.clone())
        .with_fallback(scorer);

    let domains = std::env::var("FUSEGATE_DOMAINS").unwrap_or_else(|_| "general".to_string());
    let ctx = GateContext::authorized(domains.split(',').map(str::trim).filter(|d| !d.is_empty()));

    let pipeline = EvidencePipeline::new(config, coordinator, reranker);
    let query = Query::new(text);

    match pipeline.run(&query, ctx, DEFAULT_BUDGET).await {
        Ok(output) => println!("{}", serde_json::to_string_pretty(&output)?),
        Err(e) if e.is_policy_rejection() => {
            let rejection = serde_json::json!({
                "request_id": query.request_id,
                "code": e.code(),
                "error": e.to_string(),
            });
            println!("{}", serde_json::to_string_pretty(&rejection)?);
        }
        Err(e) => return Err(e.into()),
    }

    Ok(())
}
