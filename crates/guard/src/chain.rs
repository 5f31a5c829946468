//! Sequential quality gate chain
//!
//! Gates run in order over the evidence set:
//! - a BLOCK stops the chain immediately
//! - PASS, WARN and DEGRADE continue; the terminal decision is the most
//!   severe one seen
//! - sanitizing gates rewrite evidence after their verdict

use fusegate_common::metrics::record_gate;
use fusegate_common::{AppConfig, EvidenceItem};
use serde::Serialize;
use tracing::{debug, info};

use crate::{
    CitationGate, Gate, GateContext, GateDecision, GateVerdict, PiiSanitizer, PreflightGate,
    SigmoidRiskGate,
};

/// One gate's verdict as recorded in the report
#[derive(Debug, Clone, Serialize)]
pub struct GateEvaluation {
    pub gate: &'static str,
    #[serde(flatten)]
    pub verdict: GateVerdict,
}

/// Result of a full chain run
#[derive(Debug, Clone, Serialize)]
pub struct GateReport {
    /// Terminal decision
    pub decision: GateDecision,

    /// Reason from the gate that set the terminal decision
    pub reason: String,

    /// Gate that set the terminal decision
    pub decided_by: Option<&'static str>,

    /// Verdicts in evaluation order
    pub evaluations: Vec<GateEvaluation>,

    /// Evidence after sanitation
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub evidence: Vec<EvidenceItem>,

    /// Spans redacted by sanitizing gates
    pub redactions: usize,
}

impl GateReport {
    pub fn is_blocked(&self) -> bool {
        self.decision == GateDecision::Block
    }
}

/// Chain lifecycle
#[derive(Debug, Clone, Copy, PartialEq)]
enum ChainState {
    Running(GateDecision),
    Terminal(GateDecision),
}

pub struct QualityGateChain {
    gates: Vec<Box<dyn Gate>>,
}

impl QualityGateChain {
    pub fn new(gates: Vec<Box<dyn Gate>>) -> Self {
        Self { gates }
    }

    /// Preflight, citation, sigmoid risk, then PII sanitation
    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(vec![
            Box::new(PreflightGate::new(&config.preflight)),
            Box::new(CitationGate::new(config.citation.clone())),
            Box::new(SigmoidRiskGate::new(config.gate.clone())),
            Box::new(PiiSanitizer::new()),
        ])
    }

    pub fn gate_names(&self) -> Vec<&'static str> {
        self.gates.iter().map(|g| g.name()).collect()
    }

    /// Run every gate until one blocks
    pub fn run(&self, mut evidence: Vec<EvidenceItem>, ctx: &GateContext) -> GateReport {
        let mut state = ChainState::Running(GateDecision::Pass);
        let mut reason = String::from("all gates passed");
        let mut decided_by = None;
        let mut evaluations = Vec::with_capacity(self.gates.len());
        let mut redactions = 0;

        for gate in &self.gates {
            let ChainState::Running(current) = state else {
                break;
            };

            let verdict = gate.check(&evidence, ctx);
            record_gate(gate.name(), verdict.decision.as_str());
            debug!(
                gate = gate.name(),
                decision = verdict.decision.as_str(),
                reason = %verdict.reason,
                "Gate evaluated"
            );

            if verdict.decision > current {
                reason = verdict.reason.clone();
                decided_by = Some(gate.name());
            }

            state = if verdict.decision.is_terminal() {
                ChainState::Terminal(verdict.decision)
            } else {
                redactions += gate.sanitize(&mut evidence);
                ChainState::Running(current.max(verdict.decision))
            };

            evaluations.push(GateEvaluation {
                gate: gate.name(),
                verdict,
            });
        }

        let decision = match state {
            ChainState::Running(d) | ChainState::Terminal(d) => d,
        };

        info!(
            decision = decision.as_str(),
            gates_run = evaluations.len(),
            redactions,
            "Gate chain finished"
        );

        GateReport {
            decision,
            reason,
            decided_by,
            evaluations,
            evidence,
            redactions,
        }
    }
}
