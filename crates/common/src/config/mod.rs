//! Configuration management for FuseGate
//!
//! Supports loading configuration from:
//! - Environment variables (prefixed with FUSEGATE__)
//! - Configuration files (config/default, config/{APP_ENV}, config/local)
//! - Default values
//!
//! Everything here is process-wide and read-only for the pipeline. Calibration
//! statistics may be swapped at runtime through the calibrator, never by a request.

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use validator::Validate;

/// Main application configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    /// Query complexity routing
    #[serde(default)]
    pub complexity: ComplexityConfig,

    /// Retrieval sources
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// Per-source score calibration
    #[serde(default)]
    pub calibration: CalibrationConfig,

    /// Rank fusion
    #[serde(default)]
    pub fusion: FusionConfig,

    /// Cross-encoder reranking
    #[serde(default)]
    pub cross_encoder: CrossEncoderConfig,

    /// Preflight gate
    #[serde(default)]
    pub preflight: PreflightConfig,

    /// Citation gate
    #[serde(default)]
    pub citation: CitationConfig,

    /// Sigmoid risk gate
    #[serde(default)]
    pub gate: GateConfig,

    /// Request coalescing
    #[serde(default)]
    pub coalesce: CoalesceConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ComplexityConfig {
    /// Classify queries; when false a fixed default hint is used
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Baseline web top-k
    #[serde(default = "default_web_top_k")]
    pub default_web_top_k: usize,

    /// Baseline vector top-k
    #[serde(default = "default_vector_top_k")]
    pub default_vector_top_k: usize,

    /// Whether COMPLEX queries also search the web
    #[serde(default = "default_enabled")]
    pub complex_enable_web: bool,
}

/// Kind of retrieval backend behind a source
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Web search
    Web,
    /// Vector index
    Vector,
    /// Knowledge graph
    KnowledgeGraph,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Web => "web",
            SourceKind::Vector => "vector",
            SourceKind::KnowledgeGraph => "knowledge_graph",
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetrievalConfig {
    /// Registered sources and their call policies
    #[serde(default = "default_sources")]
    pub sources: Vec<SourceConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct SourceConfig {
    /// Source name (used as the fusion/calibration key)
    pub name: String,

    /// Backend kind, decides which routing hint applies
    pub kind: SourceKind,

    /// Per-call timeout in milliseconds
    #[serde(default = "default_source_timeout")]
    #[validate(range(min = 1))]
    pub timeout_ms: u64,

    /// Maximum concurrent calls to this source
    #[serde(default = "default_source_concurrency")]
    #[validate(range(min = 1))]
    pub max_concurrency: usize,

    /// How long to wait for a concurrency slot before giving up
    #[serde(default = "default_acquire_timeout")]
    pub acquire_timeout_ms: u64,

    /// Launch a hedged duplicate after this delay (disabled when absent)
    #[serde(default)]
    pub hedge_delay_ms: Option<u64>,

    /// Request-rate quota (unlimited when absent)
    #[serde(default)]
    pub requests_per_second: Option<u32>,

    /// Fusion weight
    #[serde(default = "default_weight")]
    #[validate(range(min = 0.0))]
    pub weight: f64,
}

impl SourceConfig {
    /// Source policy with defaults for the given kind
    pub fn new(name: impl Into<String>, kind: SourceKind) -> Self {
        Self {
            name: name.into(),
            kind,
            timeout_ms: default_source_timeout(),
            max_concurrency: default_source_concurrency(),
            acquire_timeout_ms: default_acquire_timeout(),
            hedge_delay_ms: None,
            requests_per_second: None,
            weight: default_weight(),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }

    pub fn hedge_delay(&self) -> Option<Duration> {
        self.hedge_delay_ms.map(Duration::from_millis)
    }
}

/// Monotone map applied to the whitened score
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IsotonicConfig {
    /// `sigmoid(k·z)`
    Sigmoid { k: f64 },
    /// Piecewise-linear through `[z, p]` knots
    Piecewise { knots: Vec<[f64; 2]> },
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SourceCalibrationConfig {
    pub p10: f64,
    pub p50: f64,
    pub p90: f64,

    /// Platt slope
    #[serde(default = "default_platt_a")]
    pub platt_a: f64,

    /// Platt intercept
    #[serde(default)]
    pub platt_b: f64,

    #[serde(default = "default_isotonic")]
    pub isotonic: IsotonicConfig,
}

impl SourceCalibrationConfig {
    pub fn with_stats(p10: f64, p50: f64, p90: f64) -> Self {
        Self {
            p10,
            p50,
            p90,
            platt_a: default_platt_a(),
            platt_b: 0.0,
            isotonic: default_isotonic(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CoverageConfig {
    /// Exponent applied to the calibrated score
    #[serde(default = "default_gamma")]
    pub gamma: f64,

    /// Saturation rate of the coverage term
    #[serde(default = "default_lambda")]
    pub lambda: f64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CalibrationConfig {
    /// Seeded per-source statistics
    #[serde(default = "default_calibration_sources")]
    pub sources: HashMap<String, SourceCalibrationConfig>,

    /// Fallback for unknown sources
    #[serde(default = "default_calibration_fallback")]
    pub fallback: SourceCalibrationConfig,

    /// Coverage-aware rescaling (disabled when absent)
    #[serde(default)]
    pub coverage: Option<CoverageConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct FusionConfig {
    /// RRF smoothing constant
    #[serde(default = "default_rrf_k")]
    #[validate(range(min = 0.0))]
    pub rrf_k: f64,

    /// Power-mean exponent (0 = geometric mean)
    #[serde(default = "default_power_mean_p")]
    pub power_mean_p: f64,

    /// Tail fraction for the tail mean
    #[serde(default = "default_tail_alpha")]
    #[validate(range(min = 0.0, max = 1.0))]
    pub tail_alpha: f64,

    /// Per-profile source weight overrides
    #[serde(default = "default_profiles")]
    pub profiles: HashMap<String, HashMap<String, f64>>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct CrossEncoderConfig {
    /// Enable cross-encoder reranking
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Process-wide permit pool size
    #[serde(default = "default_ce_concurrency")]
    #[validate(range(min = 1))]
    pub max_concurrency: usize,

    /// How long to wait for a permit
    #[serde(default = "default_ce_queue_timeout")]
    pub queue_timeout_ms: u64,

    /// Use the bi-encoder scorer when the pool is saturated
    #[serde(default = "default_enabled")]
    pub fallback_to_bi_encoder: bool,

    /// Number of fused items considered for reranking
    #[serde(default = "default_ce_top_n")]
    #[validate(range(min = 1))]
    pub top_n: usize,

    /// Number of items returned after reranking
    #[serde(default = "default_ce_final_k")]
    #[validate(range(min = 1))]
    pub final_k: usize,
}

impl CrossEncoderConfig {
    pub fn queue_timeout(&self) -> Duration {
        Duration::from_millis(self.queue_timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PreflightConfig {
    /// Minimum evidence count
    #[serde(default = "default_min_evidence")]
    pub min_evidence: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct CitationConfig {
    /// Minimum trusted citations
    #[serde(default = "default_citation_min")]
    pub min: usize,

    /// Floor when an expanded (aggressive/rule-break) mode is active
    #[serde(default = "default_citation_min_expanded")]
    pub min_expanded_mode: usize,

    /// Minimum distinct hostnames among cited URLs
    #[serde(default = "default_host_diversity")]
    pub host_diversity_min: usize,

    /// Novelty above which one more citation is required
    #[serde(default = "default_novelty_threshold")]
    #[validate(range(min = 0.0, max = 1.0))]
    pub novelty_threshold: f64,

    /// Trusted host suffixes (empty trusts every host)
    #[serde(default)]
    pub trusted_hosts: Vec<String>,
}

/// Outcome policy when the risk score misses the threshold
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum GateMode {
    Hard,
    Soft,
    Degrade,
    #[serde(alias = "log_only", alias = "logonly")]
    LogOnly,
}

/// Which risk formula the sigmoid gate applies
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RiskGateVariant {
    /// `sigmoid(base + weighted risks) >= probability_threshold`
    Probability,
    /// Composite score against a threshold with mode dispatch
    Threshold,
    /// Calibrated probability against a per-operating-mode table
    ModeTable,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GateConfig {
    #[serde(default = "default_gate_variant")]
    pub variant: RiskGateVariant,

    #[serde(default = "default_gate_mode")]
    pub mode: GateMode,

    /// Composite threshold for the threshold form
    #[serde(default = "default_gate_threshold")]
    pub threshold: f64,

    /// Lenient composite floor used in aggressive mode
    #[serde(default = "default_lenient_floor")]
    pub lenient_floor: f64,

    /// Allow-probability threshold for the probability form
    #[serde(default = "default_probability_threshold")]
    pub probability_threshold: f64,

    #[serde(default = "default_gate_base")]
    pub base: f64,

    #[serde(default = "default_w_hall")]
    pub w_hall: f64,

    #[serde(default = "default_w_policy")]
    pub w_policy: f64,

    #[serde(default = "default_w_citation")]
    pub w_citation: f64,

    /// Top calibrated score that counts as strong evidence
    #[serde(default = "default_strong_evidence_floor")]
    pub strong_evidence_floor: f64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CoalesceConfig {
    /// Coalesce identical in-flight source calls
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Coordinate across processes with a Redis lock
    #[serde(default)]
    pub distributed: bool,

    /// Lock TTL in milliseconds
    #[serde(default = "default_lock_ttl")]
    pub lock_ttl_ms: u64,

    /// Redis URL for the distributed lock
    pub redis_url: Option<String>,

    /// Key prefix for namespacing
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
}

impl CoalesceConfig {
    pub fn lock_ttl(&self) -> Duration {
        Duration::from_millis(self.lock_ttl_ms)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level (debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default = "default_json_logging")]
    pub json_logging: bool,

    /// Metrics port (0 to disable)
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,

    /// Service name for log records
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

// Default value functions
fn default_enabled() -> bool { true }
fn default_web_top_k() -> usize { 8 }
fn default_vector_top_k() -> usize { 10 }
fn default_source_timeout() -> u64 { 800 }
fn default_source_concurrency() -> usize { 8 }
fn default_acquire_timeout() -> u64 { 50 }
fn default_weight() -> f64 { 1.0 }
fn default_platt_a() -> f64 { 3.0 }
fn default_isotonic() -> IsotonicConfig { IsotonicConfig::Sigmoid { k: 3.0 } }
fn default_gamma() -> f64 { 1.0 }
fn default_lambda() -> f64 { 3.0 }
fn default_rrf_k() -> f64 { 60.0 }
fn default_power_mean_p() -> f64 { 0.3 }
fn default_tail_alpha() -> f64 { 0.25 }
fn default_ce_concurrency() -> usize { 4 }
fn default_ce_queue_timeout() -> u64 { 50 }
fn default_ce_top_n() -> usize { 12 }
fn default_ce_final_k() -> usize { 8 }
fn default_min_evidence() -> usize { 2 }
fn default_citation_min() -> usize { 2 }
fn default_citation_min_expanded() -> usize { 3 }
fn default_host_diversity() -> usize { 1 }
fn default_novelty_threshold() -> f64 { 0.65 }
fn default_gate_variant() -> RiskGateVariant { RiskGateVariant::Threshold }
fn default_gate_mode() -> GateMode { GateMode::Soft }
fn default_gate_threshold() -> f64 { 0.5 }
fn default_lenient_floor() -> f64 { 0.3 }
fn default_probability_threshold() -> f64 { 0.5 }
fn default_gate_base() -> f64 { 3.0 }
fn default_w_hall() -> f64 { -4.0 }
fn default_w_policy() -> f64 { -3.0 }
fn default_w_citation() -> f64 { -1.0 }
fn default_strong_evidence_floor() -> f64 { 0.8 }
fn default_lock_ttl() -> u64 { 5_000 }
fn default_key_prefix() -> String { "fusegate".to_string() }
fn default_log_level() -> String { "info".to_string() }
fn default_json_logging() -> bool { true }
fn default_metrics_port() -> u16 { 9090 }
fn default_service_name() -> String { "fusegate".to_string() }

fn default_sources() -> Vec<SourceConfig> {
    let mut web = SourceConfig::new("web", SourceKind::Web);
    web.timeout_ms = 1_500;
    web.hedge_delay_ms = Some(300);
    vec![
        web,
        SourceConfig::new("vector", SourceKind::Vector),
        SourceConfig::new("knowledge_graph", SourceKind::KnowledgeGraph),
    ]
}

fn default_calibration_sources() -> HashMap<String, SourceCalibrationConfig> {
    HashMap::from([
        ("web".to_string(), SourceCalibrationConfig::with_stats(0.1, 0.5, 0.9)),
        ("vector".to_string(), SourceCalibrationConfig::with_stats(0.2, 0.55, 0.85)),
        ("knowledge_graph".to_string(), SourceCalibrationConfig::with_stats(0.1, 0.4, 0.8)),
        ("fused".to_string(), SourceCalibrationConfig::with_stats(0.1, 0.5, 0.9)),
    ])
}

fn default_calibration_fallback() -> SourceCalibrationConfig {
    SourceCalibrationConfig::with_stats(0.1, 0.5, 0.9)
}

fn default_profiles() -> HashMap<String, HashMap<String, f64>> {
    HashMap::from([(
        "domain_strict".to_string(),
        HashMap::from([
            ("web".to_string(), 0.5),
            ("vector".to_string(), 1.0),
            ("knowledge_graph".to_string(), 1.2),
        ]),
    )])
}

impl Default for ComplexityConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            default_web_top_k: default_web_top_k(),
            default_vector_top_k: default_vector_top_k(),
            complex_enable_web: default_enabled(),
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self { sources: default_sources() }
    }
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            sources: default_calibration_sources(),
            fallback: default_calibration_fallback(),
            coverage: None,
        }
    }
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            rrf_k: default_rrf_k(),
            power_mean_p: default_power_mean_p(),
            tail_alpha: default_tail_alpha(),
            profiles: default_profiles(),
        }
    }
}

impl Default for CrossEncoderConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            max_concurrency: default_ce_concurrency(),
            queue_timeout_ms: default_ce_queue_timeout(),
            fallback_to_bi_encoder: default_enabled(),
            top_n: default_ce_top_n(),
            final_k: default_ce_final_k(),
        }
    }
}

impl Default for PreflightConfig {
    fn default() -> Self {
        Self { min_evidence: default_min_evidence() }
    }
}

impl Default for CitationConfig {
    fn default() -> Self {
        Self {
            min: default_citation_min(),
            min_expanded_mode: default_citation_min_expanded(),
            host_diversity_min: default_host_diversity(),
            novelty_threshold: default_novelty_threshold(),
            trusted_hosts: Vec::new(),
        }
    }
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            variant: default_gate_variant(),
            mode: default_gate_mode(),
            threshold: default_gate_threshold(),
            lenient_floor: default_lenient_floor(),
            probability_threshold: default_probability_threshold(),
            base: default_gate_base(),
            w_hall: default_w_hall(),
            w_policy: default_w_policy(),
            w_citation: default_w_citation(),
            strong_evidence_floor: default_strong_evidence_floor(),
        }
    }
}

impl Default for CoalesceConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            distributed: false,
            lock_ttl_ms: default_lock_ttl(),
            redis_url: None,
            key_prefix: default_key_prefix(),
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logging: default_json_logging(),
            metrics_port: default_metrics_port(),
            service_name: default_service_name(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment and files
    pub fn load() -> Result<Self, ConfigError> {
        // .env is optional
        dotenvy::dotenv().ok();

        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Load base config file
            .add_source(File::with_name("config/default").required(false))

            // Load environment-specific config
            .add_source(File::with_name(&format!("config/{}", env)).required(false))

            // Load local overrides
            .add_source(File::with_name("config/local").required(false))

            // Load from environment variables with FUSEGATE__ prefix
            // e.g., FUSEGATE__GATE__MODE=hard
            .add_source(
                Environment::with_prefix("FUSEGATE")
                    .separator("__")
                    .try_parsing(true)
            )

            .build()?;

        config.try_deserialize()
    }

    /// Check numeric bounds on every validated section
    pub fn check(&self) -> crate::Result<()> {
        let invalid = |section: &str, e: validator::ValidationErrors| {
            crate::PipelineError::Configuration {
                message: format!("{}: {}", section, e),
            }
        };

        for source in &self.retrieval.sources {
            source.validate().map_err(|e| invalid(&source.name, e))?;
        }
        self.fusion.validate().map_err(|e| invalid("fusion", e))?;
        self.cross_encoder.validate().map_err(|e| invalid("cross_encoder", e))?;
        self.citation.validate().map_err(|e| invalid("citation", e))?;

        let fallback = ("fallback", &self.calibration.fallback);
        for (name, stats) in self
            .calibration
            .sources
            .iter()
            .map(|(name, stats)| (name.as_str(), stats))
            .chain(std::iter::once(fallback))
        {
            if !(stats.p10 <= stats.p50 && stats.p50 <= stats.p90) {
                return Err(crate::PipelineError::Configuration {
                    message: format!(
                        "calibration '{}' percentiles must satisfy p10 <= p50 <= p90",
                        name
                    ),
                });
            }
        }
        Ok(())
    }

    /// Fusion weight of every configured source, keyed by name
    pub fn source_weights(&self) -> HashMap<String, f64> {
        self.retrieval
            .sources
            .iter()
            .map(|s| (s.name.clone(), s.weight))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.fusion.rrf_k, 60.0);
        assert_eq!(config.citation.host_diversity_min, 1);
        assert_eq!(config.preflight.min_evidence, 2);
        assert_eq!(config.gate.mode, GateMode::Soft);
        assert!(config.complexity.enabled);
        assert!(config.check().is_ok());
    }

    #[test]
    fn test_seeded_web_stats() {
        let config = AppConfig::default();
        let web = &config.calibration.sources["web"];
        assert_eq!((web.p10, web.p50, web.p90), (0.1, 0.5, 0.9));
    }

    #[test]
    fn test_gate_mode_parsing() {
        let mode: GateMode = serde_json::from_str("\"log-only\"").unwrap();
        assert_eq!(mode, GateMode::LogOnly);
        let mode: GateMode = serde_json::from_str("\"log_only\"").unwrap();
        assert_eq!(mode, GateMode::LogOnly);
        let mode: GateMode = serde_json::from_str("\"hard\"").unwrap();
        assert_eq!(mode, GateMode::Hard);
        assert!(serde_json::from_str::<GateMode>("\"strict\"").is_err());
    }

    #[test]
    fn test_invalid_percentiles_rejected() {
        let mut config = AppConfig::default();
        config
            .calibration
            .sources
            .insert("broken".into(), SourceCalibrationConfig::with_stats(0.9, 0.5, 0.1));
        assert!(config.check().is_err());
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let mut config = AppConfig::default();
        config.cross_encoder.max_concurrency = 0;
        assert!(config.check().is_err());
    }

    #[test]
    fn test_source_weight_lookup() {
        let mut config = AppConfig::default();
        config.retrieval.sources[0].weight = 1.4;
        let weights = config.source_weights();
        assert_eq!(weights["web"], 1.4);
        assert_eq!(weights.len(), config.retrieval.sources.len());
        assert!(!weights.contains_key("unknown"));
    }
}
