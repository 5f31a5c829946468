//! Explicit per-request context threaded through every gate

use serde::{Deserialize, Serialize};

/// Operating mode of the answering stage
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperatingMode {
    /// Strict defaults
    #[default]
    Safe,
    /// Aggressive answering
    Brave,
    /// Aggressive with zero-break guarantees relaxed
    ZeroBreak,
    /// Rule-broken operation
    RuleBreak,
}

impl OperatingMode {
    /// Aggressive and rule-broken modes expand citation floors and leniency
    pub fn is_expanded(&self) -> bool {
        !matches!(self, OperatingMode::Safe)
    }

    /// Probability threshold for the mode-table risk gate
    pub fn probability_threshold(&self) -> f64 {
        match self {
            OperatingMode::Safe => 0.90,
            OperatingMode::Brave => 0.75,
            OperatingMode::ZeroBreak => 0.70,
            OperatingMode::RuleBreak => 0.65,
        }
    }
}

/// Risk inputs for the sigmoid gate
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RiskSignals {
    /// Estimated hallucination risk (0.0 - 1.0)
    pub hallucination_risk: f64,

    /// Policy risk (0.0 - 1.0)
    pub policy_risk: f64,

    /// Penalty for weak or missing citations (0.0 - 1.0)
    pub citation_penalty: f64,

    /// Composite score for the threshold form; derived when absent
    pub composite_score: Option<f64>,

    /// Calibrated probability for the mode-table form; derived when absent
    pub calibrated_probability: Option<f64>,

    /// At least one high-confidence evidence item is present
    pub has_strong_evidence: bool,
}

/// Everything a gate may consult besides the evidence itself
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GateContext {
    /// Domains the answer is allowed to cover
    pub domains: Vec<String>,

    /// Caller is authorized to receive an answer
    pub authorized: bool,

    /// Operating mode
    pub mode: OperatingMode,

    /// Novelty of the question relative to known material (0.0 - 1.0)
    pub novelty_score: f64,

    /// Risk inputs
    pub risk: RiskSignals,
}

impl GateContext {
    /// Authorized context for the given domains
    pub fn authorized(domains: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            domains: domains.into_iter().map(Into::into).collect(),
            authorized: true,
            ..Default::default()
        }
    }

    pub fn with_mode(mut self, mode: OperatingMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_novelty(mut self, novelty_score: f64) -> Self {
        self.novelty_score = novelty_score;
        self
    }

    pub fn with_risk(mut self, risk: RiskSignals) -> Self {
        self.risk = risk;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_thresholds() {
        assert_eq!(OperatingMode::Safe.probability_threshold(), 0.90);
        assert_eq!(OperatingMode::Brave.probability_threshold(), 0.75);
        assert_eq!(OperatingMode::ZeroBreak.probability_threshold(), 0.70);
        assert_eq!(OperatingMode::RuleBreak.probability_threshold(), 0.65);
    }

    #[test]
    fn test_expanded_modes() {
        assert!(!OperatingMode::Safe.is_expanded());
        assert!(OperatingMode::Brave.is_expanded());
        assert!(OperatingMode::RuleBreak.is_expanded());
    }

    #[test]
    fn test_mode_wire_names() {
        let mode: OperatingMode = serde_json::from_str("\"RULE_BREAK\"").unwrap();
        assert_eq!(mode, OperatingMode::RuleBreak);
    }
}
