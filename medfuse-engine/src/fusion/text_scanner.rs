//! Text Evidence Scanner
//!
//! Derives text findings from an [`Extraction`] by whole-word phrase matching.
//! Only labels in the allowed set (union of all domains) are ever emitted.
//!
//! Detection order:
//! 1. Keyword table (label → phrases)
//! 2. Synonym table (phrase → label)
//! 3. Blood-pressure heuristic → `hypertension_uncontrolled`

use crate::types::{Extraction, TextFinding};
use medfuse_common::config::TablesConfig;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, warn};

/// Label raised by blood-pressure readings in the symptom list
pub const HYPERTENSION_LABEL: &str = "hypertension_uncontrolled";

static BP_READING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b\d{2,3}/\d{2,3}\b").expect("static regex")
});

struct PhraseMatcher {
    phrase: String,
    pattern: Regex,
}

impl PhraseMatcher {
    fn new(phrase: &str) -> Option<Self> {
        let phrase = phrase.trim().to_lowercase();
        if phrase.is_empty() {
            return None;
        }
        match Regex::new(&format!(r"\b{}\b", regex::escape(&phrase))) {
            Ok(pattern) => Some(Self { phrase, pattern }),
            Err(e) => {
                warn!(phrase = %phrase, "Skipping unmatchable phrase: {}", e);
                None
            }
        }
    }
}

/// Keyword/synonym scanner over extracted text
pub struct TextEvidenceScanner {
    keywords: Vec<(String, Vec<PhraseMatcher>)>,
    synonyms: Vec<(String, PhraseMatcher)>,
    allowed: BTreeSet<String>,
}

impl TextEvidenceScanner {
    /// Build matchers for every allowed label in the tables
    pub fn new(tables: &TablesConfig, allowed: BTreeSet<String>) -> Self {
        let keywords = tables
            .keywords
            .iter()
            .filter(|(label, _)| allowed.contains(label.as_str()))
            .map(|(label, phrases)| {
                let matchers = phrases.iter().filter_map(|p| PhraseMatcher::new(p)).collect();
                (label.clone(), matchers)
            })
            .collect();

        let synonyms = tables
            .synonyms
            .iter()
            .filter(|(_, label)| allowed.contains(label.as_str()))
            .filter_map(|(phrase, label)| PhraseMatcher::new(phrase).map(|m| (label.clone(), m)))
            .collect();

        Self {
            keywords,
            synonyms,
            allowed,
        }
    }

    /// Scan an extraction into one text finding per detected label
    ///
    /// Evidence is deduplicated and sorted; labels keep first-detected order.
    pub fn scan(&self, extraction: &Extraction) -> Vec<TextFinding> {
        let haystack = Self::haystack(extraction);
        let mut order: Vec<String> = Vec::new();
        let mut evidence: HashMap<String, BTreeSet<String>> = HashMap::new();

        let mut record = |label: &str, phrase: String| {
            if !evidence.contains_key(label) {
                order.push(label.to_string());
            }
            evidence.entry(label.to_string()).or_default().insert(phrase);
        };

        if !haystack.is_empty() {
            for (label, matchers) in &self.keywords {
                for matcher in matchers {
                    if matcher.pattern.is_match(&haystack) {
                        record(label, matcher.phrase.clone());
                    }
                }
            }

            for (label, matcher) in &self.synonyms {
                if matcher.pattern.is_match(&haystack) {
                    record(label, matcher.phrase.clone());
                }
            }
        }

        if self.allowed.contains(HYPERTENSION_LABEL) {
            for symptom in &extraction.symptoms {
                let lower = symptom.to_lowercase();
                if lower.contains("bp") || BP_READING.is_match(&lower) {
                    record(HYPERTENSION_LABEL, symptom.clone());
                }
            }
        }

        let findings: Vec<TextFinding> = order
            .into_iter()
            .map(|label| {
                let phrases = evidence.remove(&label).unwrap_or_default();
                TextFinding {
                    label,
                    evidence: phrases.into_iter().collect(),
                }
            })
            .collect();

        debug!(count = findings.len(), "Text findings scanned");
        findings
    }

    fn haystack(extraction: &Extraction) -> String {
        let mut parts: Vec<&str> = Vec::new();
        if !extraction.chief_complaint.trim().is_empty() {
            parts.push(&extraction.chief_complaint);
        }
        parts.extend(extraction.symptoms.iter().map(String::as_str));
        parts.extend(extraction.possible_pmh.iter().map(String::as_str));
        parts.extend(extraction.possible_meds.iter().map(String::as_str));
        parts.join("\n").to_lowercase()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn scanner() -> TextEvidenceScanner {
        let mut keywords = BTreeMap::new();
        keywords.insert(
            "pneumonia_unspecified".to_string(),
            vec!["pneumonia".to_string(), "fever".to_string(), "sputum".to_string()],
        );
        keywords.insert("gerd".to_string(), vec!["heartburn".to_string()]);
        keywords.insert("not_allowed".to_string(), vec!["cough".to_string()]);
        let mut synonyms = BTreeMap::new();
        synonyms.insert("reflux".to_string(), "gerd".to_string());
        let tables = TablesConfig {
            keywords,
            synonyms,
            ..TablesConfig::default()
        };
        let allowed = ["pneumonia_unspecified", "gerd", HYPERTENSION_LABEL]
            .iter()
            .map(|s| s.to_string())
            .collect();
        TextEvidenceScanner::new(&tables, allowed)
    }

    fn extraction(symptoms: &[&str]) -> Extraction {
        Extraction {
            symptoms: symptoms.iter().map(|s| s.to_string()).collect(),
            ..Extraction::default()
        }
    }

    #[test]
    fn test_keyword_match_collects_sorted_evidence() {
        let findings = scanner().scan(&extraction(&["Fever and yellow sputum", "fever again"]));
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].label, "pneumonia_unspecified");
        assert_eq!(findings[0].evidence, vec!["fever".to_string(), "sputum".to_string()]);
    }

    #[test]
    fn test_whole_word_matching_only() {
        // "feverish" must not match "fever"
        assert!(scanner().scan(&extraction(&["feverish feeling"])).is_empty());
    }

    #[test]
    fn test_labels_outside_allowed_set_are_ignored() {
        assert!(scanner().scan(&extraction(&["dry cough"])).is_empty());
    }

    #[test]
    fn test_synonym_table_feeds_label() {
        let findings = scanner().scan(&extraction(&["reflux after dinner"]));
        assert_eq!(findings[0].label, "gerd");
        assert_eq!(findings[0].evidence, vec!["reflux".to_string()]);
    }

    #[test]
    fn test_bp_heuristic_flags_hypertension() {
        let findings = scanner().scan(&extraction(&["bp 182/115"]));
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].label, HYPERTENSION_LABEL);
        assert_eq!(findings[0].evidence, vec!["bp 182/115".to_string()]);
    }

    #[test]
    fn test_chief_complaint_and_history_are_searched() {
        let e = Extraction {
            chief_complaint: "Pneumonia follow-up".to_string(),
            possible_pmh: vec!["heartburn".to_string()],
            ..Extraction::default()
        };
        let labels: Vec<String> = scanner().scan(&e).into_iter().map(|f| f.label).collect();
        assert_eq!(labels, vec!["gerd".to_string(), "pneumonia_unspecified".to_string()]);
    }

    #[test]
    fn test_empty_extraction_yields_nothing() {
        assert!(scanner().scan(&Extraction::default()).is_empty());
    }
}
