//! Evidence Normalizer
//!
//! Maps per-modality labels into one condition label space so that an imaging
//! label and a text label naming the same concept collide under one key.

use crate::types::{Finding, TextFinding};
use std::collections::{BTreeMap, HashMap};

/// Lower-case a label and join its whitespace-separated words with `_`
///
/// `"Pleural Effusion"` → `"pleural_effusion"`.
pub fn canonicalize(label: &str) -> String {
    label
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
        .to_lowercase()
}

/// Static alias table plus canonicalization
#[derive(Debug, Clone)]
pub struct EvidenceNormalizer {
    /// canonical imaging label → canonical condition
    aliases: HashMap<String, String>,
}

impl EvidenceNormalizer {
    pub fn new(aliases: &BTreeMap<String, String>) -> Self {
        let aliases = aliases
            .iter()
            .map(|(label, condition)| (canonicalize(label), canonicalize(condition)))
            .collect();
        Self { aliases }
    }

    /// Canonical condition for an imaging label
    pub fn normalize_label(&self, label: &str) -> String {
        let key = canonicalize(label);
        match self.aliases.get(&key) {
            Some(condition) => condition.clone(),
            None => key,
        }
    }

    /// Normalize imaging findings; blank labels are dropped
    pub fn normalize_image(&self, findings: &[Finding]) -> Vec<Finding> {
        findings
            .iter()
            .filter(|f| !f.label.trim().is_empty())
            .map(|f| Finding::new(self.normalize_label(&f.label), f.score))
            .collect()
    }

    /// Canonicalize text finding labels (text labels bypass the alias table)
    pub fn normalize_text(&self, findings: &[TextFinding]) -> Vec<TextFinding> {
        findings
            .iter()
            .filter(|f| !f.label.trim().is_empty())
            .map(|f| TextFinding {
                label: canonicalize(&f.label),
                evidence: f.evidence.clone(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn normalizer() -> EvidenceNormalizer {
        let mut aliases = BTreeMap::new();
        aliases.insert("Consolidation".to_string(), "pneumonia_unspecified".to_string());
        aliases.insert("Pleural Effusion".to_string(), "pleural_effusion".to_string());
        EvidenceNormalizer::new(&aliases)
    }

    #[test]
    fn test_canonicalize_collapses_whitespace_and_case() {
        assert_eq!(canonicalize("  Enlarged   Cardiomediastinum "), "enlarged_cardiomediastinum");
        assert_eq!(canonicalize("cardiomegaly"), "cardiomegaly");
    }

    #[test]
    fn test_alias_lookup_is_case_insensitive() {
        let n = normalizer();
        assert_eq!(n.normalize_label("Consolidation"), "pneumonia_unspecified");
        assert_eq!(n.normalize_label("pleural effusion"), "pleural_effusion");
    }

    #[test]
    fn test_unmapped_label_is_canonicalized() {
        assert_eq!(normalizer().normalize_label("Cardiomegaly"), "cardiomegaly");
    }

    #[test]
    fn test_normalize_image_keeps_scores_and_drops_blank_labels() {
        let out = normalizer().normalize_image(&[
            Finding::new("Consolidation", 0.6),
            Finding::new(" ", 0.9),
        ]);
        assert_eq!(out, vec![Finding::new("pneumonia_unspecified", 0.6)]);
    }

    #[test]
    fn test_image_and_text_references_collide() {
        let n = normalizer();
        let image = n.normalize_image(&[Finding::new("Pleural Effusion", 0.7)]);
        let text = n.normalize_text(&[TextFinding {
            label: "Pleural_Effusion".to_string(),
            evidence: vec![],
        }]);
        assert_eq!(image[0].label, text[0].label);
    }
}
