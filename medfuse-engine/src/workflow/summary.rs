//! Compact summary construction

use crate::types::{ConfidenceSummary, ProposedQuestion, RankedCandidate};
use medfuse_common::config::DisplayConfig;
use medfuse_common::events::{CompactSummary, SummaryAlerts};

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Minimal display payload for one pipeline run
///
/// Alternates are the candidates after the leader, up to
/// `max_candidates_displayed - 1`, that score at least
/// `min_confidence_displayed`.
pub fn build_summary(
    ranked: &[RankedCandidate],
    confidence: ConfidenceSummary,
    questions: &[ProposedQuestion],
    red_flag: bool,
    display: &DisplayConfig,
) -> CompactSummary {
    let alts = ranked
        .iter()
        .skip(1)
        .take(display.max_candidates_displayed.saturating_sub(1))
        .filter(|c| c.score >= display.min_confidence_displayed)
        .map(|c| format!("{} {:.2}", c.condition, c.score))
        .collect();

    CompactSummary {
        dx: ranked.first().map(|c| c.condition.clone()),
        conf: round2(confidence.top_confidence),
        alts,
        next_question: questions.first().map(|q| q.q.clone()),
        alerts: SummaryAlerts {
            red_flag,
            margin: round2(confidence.margin),
        },
    }
}
