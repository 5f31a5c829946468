//! Preflight gate
//!
//! Rejects before any answer work when the request has no domain,
//! too little evidence, or no authorization.

use fusegate_common::config::PreflightConfig;
use fusegate_common::EvidenceItem;

use crate::{Gate, GateContext, GateVerdict};

pub struct PreflightGate {
    min_evidence: usize,
}

impl PreflightGate {
    pub fn new(config: &PreflightConfig) -> Self {
        Self {
            min_evidence: config.min_evidence,
        }
    }
}

impl Gate for PreflightGate {
    fn name(&self) -> &'static str {
        "preflight"
    }

    fn check(&self, evidence: &[EvidenceItem], ctx: &GateContext) -> GateVerdict {
        if !ctx.domains.iter().any(|d| !d.trim().is_empty()) {
            return GateVerdict::block("no domain in scope");
        }

        if evidence.len() < self.min_evidence {
            return GateVerdict::block(format!(
                "evidence count {} below minimum {}",
                evidence.len(),
                self.min_evidence
            ))
            .with_deficit(self.min_evidence - evidence.len());
        }

        if !ctx.authorized {
            return GateVerdict::block("caller not authorized");
        }

        GateVerdict::pass(format!("{} evidence items", evidence.len()))
    }
}
