//! FuseGate Common Library
//!
//! Shared code for the FuseGate crates including:
//! - Request-scoped evidence types
//! - Error types and handling
//! - Configuration management
//! - Distributed locking
//! - Metrics and observability

pub mod config;
pub mod errors;
pub mod evidence;
pub mod lock;
pub mod metrics;

// Re-export commonly used types
pub use config::AppConfig;
pub use errors::{ErrorCode, PipelineError, Result};
pub use evidence::{EvidenceItem, Query};
pub use lock::DistributedLock;

use config::ObservabilityConfig;
use tracing_subscriber::EnvFilter;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the global tracing subscriber
///
/// `RUST_LOG` wins over the configured level when set.
pub fn init_tracing(config: &ObservabilityConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    // A second init (tests, embedding) is not an error
    let installed = if config.json_logging {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    if installed.is_ok() {
        tracing::info!(
            service = %config.service_name,
            level = %config.log_level,
            "Tracing initialized"
        );
    }
}
