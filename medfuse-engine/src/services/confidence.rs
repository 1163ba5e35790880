//! Confidence Evaluator
//!
//! Reduces a ranked list to its top-1 confidence and top1-top2 margin.

use crate::types::{ConfidenceSummary, RankedCandidate};
use serde::{Deserialize, Serialize};

/// Top confidence and margin of a ranked list
///
/// - empty list → `(0, 0)`
/// - one candidate → `(s, s)`
/// - two or more → `(top, max(0, top - second))`
///
/// The list is assumed sorted by non-increasing score.
pub fn confidence_and_margin(ranked: &[RankedCandidate]) -> ConfidenceSummary {
    match ranked {
        [] => ConfidenceSummary::default(),
        [only] => ConfidenceSummary {
            top_confidence: only.score,
            margin: only.score,
        },
        [top, second, ..] => ConfidenceSummary {
            top_confidence: top.score,
            margin: (top.score - second.score).max(0.0),
        },
    }
}

/// Coarse breadth of the differential, handed to the question proposer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScopeHint {
    /// Confidence below 0.45
    Broad,
    /// Confidence in [0.45, 0.70)
    Mixed,
    /// Confidence 0.70 and above
    Chest,
}

pub fn scope_hint(top_confidence: f64) -> ScopeHint {
    if top_confidence < 0.45 {
        ScopeHint::Broad
    } else if top_confidence < 0.70 {
        ScopeHint::Mixed
    } else {
        ScopeHint::Chest
    }
}
