//! Error types for FuseGate
//!
//! Provides a small error taxonomy for the retrieval pipeline:
//! - Infrastructure faults that are recovered locally (source outages,
//!   saturated pools, per-candidate inference failures)
//! - Policy rejections from the gate chain, which end a request
//! - Validation and configuration errors at the edges
//! - Error codes for machine-readable handling

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using PipelineError
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Error codes for machine-readable error identification
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Validation errors (1xxx)
    ValidationError,
    InvalidQuery,

    // Policy errors (3xxx)
    GateRejected,

    // Retrieval errors (8xxx)
    SourceUnavailable,
    SourceTimeout,
    ConcurrencyExhausted,
    InferenceFailure,
    LockError,

    // Internal errors (9xxx)
    InternalError,
    ConfigurationError,
}

impl ErrorCode {
    /// Get the numeric code for this error
    pub fn as_code(&self) -> u16 {
        match self {
            // Validation (1xxx)
            ErrorCode::ValidationError => 1001,
            ErrorCode::InvalidQuery => 1002,

            // Policy (3xxx)
            ErrorCode::GateRejected => 3001,

            // Retrieval (8xxx)
            ErrorCode::SourceUnavailable => 8001,
            ErrorCode::SourceTimeout => 8002,
            ErrorCode::ConcurrencyExhausted => 8003,
            ErrorCode::InferenceFailure => 8004,
            ErrorCode::LockError => 8005,

            // Internal (9xxx)
            ErrorCode::InternalError => 9001,
            ErrorCode::ConfigurationError => 9002,
        }
    }
}

/// Pipeline error types
///
/// Errors are `Clone` so that a single settled result can be handed to every
/// caller that joined a coalesced computation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PipelineError {
    // Validation errors
    #[error("Validation failed: {message}")]
    Validation { message: String },

    #[error("Invalid query: {message}")]
    InvalidQuery { message: String },

    // Policy errors
    #[error("Gate '{gate}' rejected the evidence set: {reason}")]
    GateRejected { gate: String, reason: String },

    // Retrieval errors
    #[error("Source '{source_name}' unavailable: {message}")]
    SourceUnavailable { source_name: String, message: String },

    #[error("Source '{source_name}' timed out after {timeout_ms}ms")]
    SourceTimeout { source_name: String, timeout_ms: u64 },

    #[error("Concurrency exhausted for pool: {pool}")]
    ConcurrencyExhausted { pool: String },

    #[error("Inference failure: {message}")]
    InferenceFailure { message: String },

    #[error("Lock error: {message}")]
    LockError { message: String },

    // Internal errors
    #[error("Internal error: {message}")]
    Internal { message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },
}

impl PipelineError {
    /// Get the error code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            PipelineError::Validation { .. } => ErrorCode::ValidationError,
            PipelineError::InvalidQuery { .. } => ErrorCode::InvalidQuery,
            PipelineError::GateRejected { .. } => ErrorCode::GateRejected,
            PipelineError::SourceUnavailable { .. } => ErrorCode::SourceUnavailable,
            PipelineError::SourceTimeout { .. } => ErrorCode::SourceTimeout,
            PipelineError::ConcurrencyExhausted { .. } => ErrorCode::ConcurrencyExhausted,
            PipelineError::InferenceFailure { .. } => ErrorCode::InferenceFailure,
            PipelineError::LockError { .. } => ErrorCode::LockError,
            PipelineError::Internal { .. } => ErrorCode::InternalError,
            PipelineError::Configuration { .. } => ErrorCode::ConfigurationError,
        }
    }

    /// Deliberate policy decision rather than a fault; never retried
    pub fn is_policy_rejection(&self) -> bool {
        matches!(self, PipelineError::GateRejected { .. })
    }

    /// Infrastructure faults the pipeline degrades around instead of aborting
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            PipelineError::SourceUnavailable { .. }
                | PipelineError::SourceTimeout { .. }
                | PipelineError::ConcurrencyExhausted { .. }
                | PipelineError::InferenceFailure { .. }
                | PipelineError::LockError { .. }
        )
    }

    /// Shorthand for an inference failure
    pub fn inference(message: impl Into<String>) -> Self {
        PipelineError::InferenceFailure { message: message.into() }
    }

    /// Shorthand for a source failure
    pub fn source_unavailable(source_name: impl Into<String>, message: impl Into<String>) -> Self {
        PipelineError::SourceUnavailable {
            source_name: source_name.into(),
            message: message.into(),
        }
    }
}

impl From<redis::RedisError> for PipelineError {
    fn from(err: redis::RedisError) -> Self {
        PipelineError::LockError {
            message: err.to_string()
        }
    }
}

impl From<tokio::task::JoinError> for PipelineError {
    fn from(err: tokio::task::JoinError) -> Self {
        PipelineError::Internal {
            message: format!("Background task failed: {}", err),
        }
    }
}

impl From<validator::ValidationErrors> for PipelineError {
    fn from(err: validator::ValidationErrors) -> Self {
        PipelineError::InvalidQuery {
            message: err.to_string(),
        }
    }
}

impl From<config::ConfigError> for PipelineError {
    fn from(err: config::ConfigError) -> Self {
        PipelineError::Configuration {
            message: err.to_string(),
        }
    }
}
