//! Core evidence types shared by the fusion, gating and session layers

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

// ============================================================================
// Findings
// ============================================================================

/// One (label, score) evidence unit from a single modality
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub label: String,
    /// Probability in [0, 1]
    pub score: f64,
}

impl Finding {
    pub fn new(label: impl Into<String>, score: f64) -> Self {
        Self {
            label: label.into(),
            score,
        }
    }

    /// Best-effort conversion from a loosely typed payload entry
    ///
    /// Accepts `score` or `prob` for the probability. Returns `None` when the
    /// label is missing/blank or the score is missing/non-finite.
    pub fn from_value(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        let label = obj.get("label")?.as_str()?.trim();
        if label.is_empty() {
            return None;
        }
        let score = obj.get("score").or_else(|| obj.get("prob"))?.as_f64()?;
        if !score.is_finite() {
            return None;
        }
        Some(Self::new(label, score))
    }
}

/// Convert a list of raw entries, skipping malformed ones
pub fn findings_from_values(values: &[Value]) -> Vec<Finding> {
    values
        .iter()
        .filter_map(|value| {
            let finding = Finding::from_value(value);
            if finding.is_none() {
                debug!(entry = %value, "Skipping malformed finding");
            }
            finding
        })
        .collect()
}

/// Text-derived finding: a label plus the phrases that matched it
///
/// Evidence strings are kept for audit only; fusion counts findings, not
/// phrases.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextFinding {
    pub label: String,
    pub evidence: Vec<String>,
}

// ============================================================================
// Ranking
// ============================================================================

/// Condition with its fused score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedCandidate {
    pub condition: String,
    pub score: f64,
    pub rationale: String,
}

/// Top-1 confidence and top1-top2 margin of a ranked list
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ConfidenceSummary {
    pub top_confidence: f64,
    pub margin: f64,
}

// ============================================================================
// Collaborator outputs
// ============================================================================

/// Structured fields pulled from the dialogue by the extraction collaborator
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Extraction {
    pub chief_complaint: String,
    pub symptoms: Vec<String>,
    pub duration: Option<String>,
    pub possible_pmh: Vec<String>,
    pub possible_meds: Vec<String>,
    pub retrieval_query: String,
}

/// Characters of dialogue used as the fallback retrieval query
pub const RETRIEVAL_QUERY_CHARS: usize = 200;

impl Extraction {
    /// Empty extraction used when the collaborator fails
    pub fn neutral(dialogue: &str) -> Self {
        Self {
            retrieval_query: dialogue.chars().take(RETRIEVAL_QUERY_CHARS).collect(),
            ..Self::default()
        }
    }
}

/// Priority class of a proposed question
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum QuestionPriority {
    RedFlag,
    Triage,
    Disposition,
    Detail,
}

impl QuestionPriority {
    /// Parse a wire value; anything unknown becomes `Detail`
    pub fn parse_lenient(value: &str) -> Self {
        match value.trim() {
            "red-flag" => QuestionPriority::RedFlag,
            "triage" => QuestionPriority::Triage,
            "disposition" => QuestionPriority::Disposition,
            _ => QuestionPriority::Detail,
        }
    }
}

/// Clarifying question suggested by the question proposer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProposedQuestion {
    pub q: String,
    pub priority: QuestionPriority,
    pub targets: Vec<String>,
    pub info_gain: f64,
    pub why: String,
}
