//! Red-Flag Detector
//!
//! Raises alerts for critical conditions ranked near the top, for red-flag
//! symptom phrasing in the extraction, and for critical vital signs in a
//! bound EHR record.

use crate::services::ehr_directory::VitalSigns;
use crate::types::{Extraction, RankedCandidate};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Critical conditions are only considered within this many top candidates
const TOP_CANDIDATES_CHECKED: usize = 3;

/// Score a critical condition must exceed to raise an alert
const CRITICAL_SCORE: f64 = 0.7;

const CHEST_PAIN_QUALIFIERS: &[&str] = &["crushing", "severe", "radiating", "pressure"];
const NEURO_TERMS: &[&str] = &["stroke", "paralysis", "numbness", "weakness"];
const BREATHING_TERMS: &[&str] = &["shortness of breath", "difficulty breathing", "chest tightness"];

/// One raised alert
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RedFlag {
    /// Condition or finding the alert is about
    pub condition: String,
    pub message: String,
}

impl RedFlag {
    fn new(condition: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            condition: condition.into(),
            message: message.into(),
        }
    }
}

/// Rule-based alert detector
#[derive(Debug, Clone)]
pub struct RedFlagDetector {
    critical_conditions: HashSet<String>,
}

impl RedFlagDetector {
    pub fn new(critical_conditions: &[String]) -> Self {
        Self {
            critical_conditions: critical_conditions.iter().cloned().collect(),
        }
    }

    /// Collect every alert raised by the current evidence
    pub fn detect(
        &self,
        ranked: &[RankedCandidate],
        extraction: &Extraction,
        vitals: Option<&VitalSigns>,
    ) -> Vec<RedFlag> {
        let mut flags = Vec::new();

        for candidate in ranked.iter().take(TOP_CANDIDATES_CHECKED) {
            if candidate.score > CRITICAL_SCORE && self.critical_conditions.contains(&candidate.condition) {
                flags.push(RedFlag::new(
                    &candidate.condition,
                    format!(
                        "High probability of {}; immediate evaluation required",
                        candidate.condition.replace('_', " ")
                    ),
                ));
            }
        }

        for symptom in &extraction.symptoms {
            flags.extend(symptom_flags(&symptom.to_lowercase()));
        }

        if let Some(vitals) = vitals {
            flags.extend(vital_sign_flags(vitals));
        }

        flags
    }
}

fn symptom_flags(symptom: &str) -> Vec<RedFlag> {
    let mut flags = Vec::new();
    if symptom.contains("chest pain") && CHEST_PAIN_QUALIFIERS.iter().any(|t| symptom.contains(t)) {
        flags.push(RedFlag::new(
            "acute_coronary_syndrome",
            "Severe chest pain with concerning features",
        ));
    }
    if NEURO_TERMS.iter().any(|t| symptom.contains(t)) {
        flags.push(RedFlag::new(
            "stroke_suspected",
            "Neurological symptoms suggest possible stroke",
        ));
    }
    if BREATHING_TERMS.iter().any(|t| symptom.contains(t))
        && (symptom.contains("severe") || symptom.contains("can't breathe"))
    {
        flags.push(RedFlag::new("respiratory_distress", "Severe respiratory symptoms"));
    }
    flags
}

fn vital_sign_flags(vitals: &VitalSigns) -> Vec<RedFlag> {
    let mut flags = Vec::new();
    if let Some((systolic, diastolic)) = vitals.blood_pressure() {
        if systolic >= 180 || diastolic >= 110 {
            flags.push(RedFlag::new(
                "hypertensive_crisis",
                format!("Blood pressure {}/{} indicates hypertensive crisis", systolic, diastolic),
            ));
        }
    }
    if matches!(vitals.hr, Some(hr) if hr > 120.0) {
        flags.push(RedFlag::new("severe_tachycardia", "Heart rate above 120 bpm"));
    }
    if matches!(vitals.spo2_pct, Some(spo2) if spo2 < 90.0) {
        flags.push(RedFlag::new("hypoxia", "Oxygen saturation below 90%"));
    }
    if matches!(vitals.temp_f, Some(temp) if temp > 103.0) {
        flags.push(RedFlag::new("high_fever", "Temperature above 103°F"));
    }
    flags
}
