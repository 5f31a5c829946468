//! FuseGate Guard
//!
//! Policy gates applied to a fused evidence set before any answer is built:
//! - Preflight (domain, evidence count, authorization)
//! - Citation floors with novelty and mode adjustments
//! - Sigmoid risk scoring in three configurable forms
//! - PII redaction of evidence text

pub mod chain;
pub mod citation;
pub mod context;
pub mod decision;
pub mod pii;
pub mod preflight;
pub mod risk;

pub use chain::{GateEvaluation, GateReport, QualityGateChain};
pub use citation::{append_top_citation, has_citation, CitationGate};
pub use context::{GateContext, OperatingMode, RiskSignals};
pub use decision::{GateDecision, GateVerdict};
pub use pii::PiiSanitizer;
pub use preflight::PreflightGate;
pub use risk::SigmoidRiskGate;

use fusegate_common::EvidenceItem;

/// A single policy gate in the chain
pub trait Gate: Send + Sync {
    /// Stable name used in reports and metrics
    fn name(&self) -> &'static str;

    /// Judge the evidence set
    fn check(&self, evidence: &[EvidenceItem], ctx: &GateContext) -> GateVerdict;

    /// Rewrite evidence after a non-blocking verdict, returning the number of edits
    fn sanitize(&self, _evidence: &mut [EvidenceItem]) -> usize {
        0
    }
}
