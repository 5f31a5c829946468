//! Gate decisions and verdicts

use serde::{Deserialize, Serialize};

/// Outcome of a gate, ordered by severity
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GateDecision {
    Pass,
    Warn,
    Degrade,
    Block,
}

impl GateDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            GateDecision::Pass => "pass",
            GateDecision::Warn => "warn",
            GateDecision::Degrade => "degrade",
            GateDecision::Block => "block",
        }
    }

    /// Only BLOCK halts the chain
    pub fn is_terminal(&self) -> bool {
        matches!(self, GateDecision::Block)
    }
}

/// A decision plus its human-readable reason
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GateVerdict {
    pub decision: GateDecision,
    pub reason: String,

    /// Numeric shortfall for count-based rejections
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deficit: Option<usize>,
}

impl GateVerdict {
    pub fn new(decision: GateDecision, reason: impl Into<String>) -> Self {
        Self {
            decision,
            reason: reason.into(),
            deficit: None,
        }
    }

    pub fn pass(reason: impl Into<String>) -> Self {
        Self::new(GateDecision::Pass, reason)
    }

    pub fn block(reason: impl Into<String>) -> Self {
        Self::new(GateDecision::Block, reason)
    }

    pub fn with_deficit(mut self, deficit: usize) -> Self {
        self.deficit = Some(deficit);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_order() {
        assert!(GateDecision::Block > GateDecision::Degrade);
        assert!(GateDecision::Degrade > GateDecision::Warn);
        assert!(GateDecision::Warn > GateDecision::Pass);
        assert!(GateDecision::Block.is_terminal());
        assert!(!GateDecision::Degrade.is_terminal());
    }
}
