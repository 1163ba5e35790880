//! Question Gate
//!
//! Decides, from top confidence and margin, whether the question proposer is
//! consulted on this pipeline pass.
//!
//! Precedence in `full` mode:
//! 1. near-certain (`top >= near_certain_confidence` and
//!    `margin >= near_certain_margin_floor`) → [`GateDecision::Suppress`]
//! 2. `top < ask_threshold` or `margin < margin_threshold` → [`GateDecision::Ask`]
//! 3. otherwise → [`GateDecision::Hold`]

use crate::types::{ConfidenceSummary, ProposedQuestion};
use medfuse_common::config::{GateConfig, GateMode};
use serde::Serialize;

/// Outcome of one gate evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GateDecision {
    /// Gating switched off; no questions
    Disabled,
    /// Ranking is near-certain; keep at most one previous question
    Suppress,
    /// Consult the question proposer
    Ask,
    /// No request; previous questions stay
    Hold,
}

#[derive(Debug, Clone)]
pub struct QuestionGate {
    config: GateConfig,
}

impl QuestionGate {
    pub fn new(config: &GateConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    pub fn decide(&self, summary: ConfidenceSummary) -> GateDecision {
        if self.config.mode == GateMode::Disabled {
            return GateDecision::Disabled;
        }
        let ConfidenceSummary { top_confidence, margin } = summary;
        if top_confidence >= self.config.near_certain_confidence
            && margin >= self.config.near_certain_margin_floor
        {
            GateDecision::Suppress
        } else if self.should_ask(top_confidence, margin) {
            GateDecision::Ask
        } else {
            GateDecision::Hold
        }
    }

    /// Raw threshold test, without the near-certain override or mode
    pub fn should_ask(&self, top_confidence: f64, margin: f64) -> bool {
        top_confidence < self.config.ask_threshold || margin < self.config.margin_threshold
    }

    /// Questions kept when the proposer is not consulted
    ///
    /// Returns `None` for [`GateDecision::Ask`]; the caller must request new
    /// questions instead.
    pub fn carry_over(
        &self,
        decision: GateDecision,
        previous: &[ProposedQuestion],
    ) -> Option<Vec<ProposedQuestion>> {
        match decision {
            GateDecision::Disabled => Some(Vec::new()),
            GateDecision::Suppress => Some(previous.iter().take(1).cloned().collect()),
            GateDecision::Hold => Some(previous.to_vec()),
            GateDecision::Ask => None,
        }
    }

    pub fn max_questions(&self) -> usize {
        self.config.max_questions
    }
}
