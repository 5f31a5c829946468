//! Sigmoid risk gate
//!
//! Three configuration-selected formulas share one strong-evidence override
//! and one mode dispatch for failures:
//! - `probability`: weighted risks through a sigmoid against a threshold
//! - `threshold`: composite score with an aggressive-mode lenient floor
//! - `mode_table`: calibrated probability against a per-operating-mode table

use fusegate_common::config::{GateConfig, GateMode, RiskGateVariant};
use fusegate_common::EvidenceItem;
use tracing::warn;

use crate::{Gate, GateContext, GateDecision, GateVerdict, RiskSignals};

/// Policy risk below which strong evidence passes unconditionally
const STRONG_EVIDENCE_POLICY_CEILING: f64 = 0.7;

/// Policy risk below which aggressive mode may use the lenient floor
const LENIENT_POLICY_CEILING: f64 = 0.5;

pub struct SigmoidRiskGate {
    config: GateConfig,
}

fn sigmoid(x: f64) -> f64 {
    if x >= 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        let e = x.exp();
        e / (1.0 + e)
    }
}

impl SigmoidRiskGate {
    pub fn new(config: GateConfig) -> Self {
        Self { config }
    }

    /// `sigmoid(base + w_hall*hall + w_policy*policy + w_citation*penalty)`
    pub fn allow_probability(&self, risk: &RiskSignals) -> f64 {
        let z = self.config.base
            + self.config.w_hall * risk.hallucination_risk
            + self.config.w_policy * risk.policy_risk
            + self.config.w_citation * risk.citation_penalty;
        sigmoid(z)
    }

    /// Composite score, derived from the weighted risks when not supplied
    pub fn composite(&self, risk: &RiskSignals) -> f64 {
        risk.composite_score.unwrap_or_else(|| self.allow_probability(risk))
    }

    /// Threshold-form decision in priority order
    pub fn decide_threshold(
        &self,
        composite: f64,
        policy_risk: f64,
        has_strong_evidence: bool,
        aggressive: bool,
    ) -> GateDecision {
        if has_strong_evidence && policy_risk < STRONG_EVIDENCE_POLICY_CEILING {
            return GateDecision::Pass;
        }
        if self.lenient_pass(composite, policy_risk, aggressive) {
            return GateDecision::Pass;
        }
        if composite >= self.config.threshold {
            return GateDecision::Pass;
        }
        self.dispatch()
    }

    /// Aggressive modes accept low-policy-risk evidence down to the lenient floor
    fn lenient_pass(&self, composite: f64, policy_risk: f64, aggressive: bool) -> bool {
        aggressive && policy_risk < LENIENT_POLICY_CEILING && composite >= self.config.lenient_floor
    }

    /// Outcome for a failed check under the configured gate mode
    fn dispatch(&self) -> GateDecision {
        match self.config.mode {
            GateMode::Hard => GateDecision::Block,
            GateMode::Soft => GateDecision::Warn,
            GateMode::Degrade => GateDecision::Degrade,
            GateMode::LogOnly => GateDecision::Pass,
        }
    }

    fn verdict(&self, decision: GateDecision, score: f64, threshold: f64) -> GateVerdict {
        let passed = score >= threshold;
        if !passed && self.config.mode == GateMode::LogOnly {
            warn!(score, threshold, "Risk gate failed in log-only mode");
            let reason = format!("log-only: score {:.3} below {:.3}", score, threshold);
            return GateVerdict::pass(reason);
        }

        let relation = if passed { ">=" } else { "<" };
        GateVerdict::new(
            decision,
            format!("score {:.3} {} {:.3}", score, relation, threshold),
        )
    }
}

impl Gate for SigmoidRiskGate {
    fn name(&self) -> &'static str {
        "sigmoid_risk"
    }

    fn check(&self, _evidence: &[EvidenceItem], ctx: &GateContext) -> GateVerdict {
        let risk = &ctx.risk;

        if risk.has_strong_evidence && risk.policy_risk < STRONG_EVIDENCE_POLICY_CEILING {
            return GateVerdict::pass("strong evidence override");
        }

        match self.config.variant {
            RiskGateVariant::Probability => {
                let prob = self.allow_probability(risk);
                let threshold = self.config.probability_threshold;
                let decision = if prob >= threshold {
                    GateDecision::Pass
                } else {
                    self.dispatch()
                };
                self.verdict(decision, prob, threshold)
            }
            RiskGateVariant::Threshold => {
                let composite = self.composite(risk);
                let aggressive = ctx.mode.is_expanded();
                let decision = self.decide_threshold(
                    composite,
                    risk.policy_risk,
                    risk.has_strong_evidence,
                    aggressive,
                );

                if self.lenient_pass(composite, risk.policy_risk, aggressive)
                    && composite < self.config.threshold
                {
                    return GateVerdict::pass(format!(
                        "composite {:.3} above lenient floor {:.3}",
                        composite, self.config.lenient_floor
                    ));
                }
                self.verdict(decision, composite, self.config.threshold)
            }
            RiskGateVariant::ModeTable => {
                let prob = risk
                    .calibrated_probability
                    .unwrap_or_else(|| self.allow_probability(risk));
                let threshold = ctx.mode.probability_threshold();
                let decision = if prob >= threshold {
                    GateDecision::Pass
                } else {
                    self.dispatch()
                };
                self.verdict(decision, prob, threshold)
            }
        }
    }
}
