//! Best-effort payload parsing
//!
//! Collaborator output is loosely typed and often wrapped in prose or markdown
//! code fences. Parsing never fails: anything unusable becomes the neutral
//! default for that payload.

use crate::types::{findings_from_values, Extraction, Finding, ProposedQuestion, QuestionPriority};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use tracing::{debug, warn};

/// Blood-pressure readings in free dialogue, with or without a `bp` prefix
static BP_IN_DIALOGUE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:bp\s*)?(\d{2,3}/\d{2,3})\b").expect("static regex")
});

/// Wording that turns a question into advice
const PRESCRIPTIVE_WORDS: &[&str] = &["take", "start", "mg", "dose", "prescribe", "diagnose"];

const MAX_TARGETS: usize = 3;
const MAX_WHY_CHARS: usize = 140;
const DEFAULT_INFO_GAIN: f64 = 0.5;

fn strip_code_fence(raw: &str) -> &str {
    let mut text = raw.trim();
    if let Some(rest) = text.strip_prefix("```json") {
        text = rest;
    } else if let Some(rest) = text.strip_prefix("```") {
        text = rest;
    }
    if let Some(rest) = text.strip_suffix("```") {
        text = rest;
    }
    text.trim()
}

/// Recover a JSON value from raw collaborator output
///
/// Tries, in order: the text as-is, the text without code fences, and the
/// slice between the outermost `{` and `}`.
pub fn recover_json(raw: &str) -> Option<Value> {
    if let Ok(value) = serde_json::from_str::<Value>(raw.trim()) {
        return Some(value);
    }
    let unfenced = strip_code_fence(raw);
    if let Ok(value) = serde_json::from_str::<Value>(unfenced) {
        return Some(value);
    }
    let start = unfenced.find('{')?;
    let end = unfenced.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str::<Value>(&unfenced[start..=end]).ok()
}

/// Like [`recover_json`], but only accepts an object
pub fn recover_json_object(raw: &str) -> Option<Map<String, Value>> {
    match recover_json(raw)? {
        Value::Object(map) => Some(map),
        _ => None,
    }
}

fn string_field(obj: &Map<String, Value>, key: &str) -> Option<String> {
    obj.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn string_list(obj: &Map<String, Value>, key: &str) -> Vec<String> {
    match obj.get(key) {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        Some(Value::String(single)) if !single.trim().is_empty() => vec![single.trim().to_string()],
        _ => Vec::new(),
    }
}

/// Parse an extraction payload
///
/// Fields may sit at the top level or under `"extracted"`. Every blood-pressure
/// reading found in the dialogue is appended to the symptoms as `"bp NNN/NN"`
/// unless already present.
pub fn parse_extraction(raw: &str, dialogue: &str) -> Extraction {
    let mut extraction = match recover_json_object(raw) {
        Some(top) => {
            let fields = match top.get("extracted") {
                Some(Value::Object(inner)) => inner,
                _ => &top,
            };
            let fallback = Extraction::neutral(dialogue);
            Extraction {
                chief_complaint: string_field(fields, "chief_complaint").unwrap_or_default(),
                symptoms: string_list(fields, "symptoms"),
                duration: string_field(fields, "duration"),
                possible_pmh: string_list(fields, "possible_pmh"),
                possible_meds: string_list(fields, "possible_meds"),
                retrieval_query: string_field(&top, "retrieval_query")
                    .or_else(|| string_field(fields, "retrieval_query"))
                    .unwrap_or(fallback.retrieval_query),
            }
        }
        None => {
            warn!("Extraction payload unreadable, using neutral extraction");
            Extraction::neutral(dialogue)
        }
    };

    append_blood_pressure(&mut extraction, dialogue);
    extraction
}

/// Append each `NNN/NN` reading in the dialogue to the symptoms as `"bp NNN/NN"`
pub fn append_blood_pressure(extraction: &mut Extraction, dialogue: &str) {
    for capture in BP_IN_DIALOGUE.captures_iter(dialogue) {
        let token = format!("bp {}", &capture[1]);
        let present = extraction
            .symptoms
            .iter()
            .any(|s| s.to_lowercase() == token);
        if !present {
            extraction.symptoms.push(token);
        }
    }
}

fn is_prescriptive(text: &str) -> bool {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .any(|word| {
            let word = word.to_lowercase();
            PRESCRIPTIVE_WORDS.contains(&word.as_str())
        })
}

fn parse_question(value: &Value) -> Option<ProposedQuestion> {
    let obj = value.as_object()?;
    let q = obj.get("q").and_then(Value::as_str).map(str::trim).unwrap_or_default();
    if q.is_empty() {
        return None;
    }
    if is_prescriptive(q) {
        debug!(question = %q, "Dropping prescriptive question");
        return None;
    }
    let priority = obj
        .get("priority")
        .and_then(Value::as_str)
        .map(QuestionPriority::parse_lenient)
        .unwrap_or(QuestionPriority::Detail);
    let mut targets = string_list(obj, "targets");
    targets.truncate(MAX_TARGETS);
    let info_gain = obj
        .get("info_gain")
        .and_then(|v| v.as_f64().or_else(|| v.as_str().and_then(|s| s.trim().parse().ok())))
        .filter(|g| g.is_finite())
        .unwrap_or(DEFAULT_INFO_GAIN)
        .clamp(0.0, 1.0);
    let why = obj
        .get("why")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .chars()
        .take(MAX_WHY_CHARS)
        .collect();
    Some(ProposedQuestion {
        q: q.to_string(),
        priority,
        targets,
        info_gain,
        why,
    })
}

/// Parse a question payload with guardrails applied
///
/// Accepts `{"questions": [...]}` or a bare array. Empty and prescriptive
/// questions are dropped; at most `max_questions` are kept.
///
/// The cap applies after filtering, so a dropped question frees a slot, and
/// prescriptive words match whole words only ("mistake" is not "take").
pub fn parse_questions(raw: &str, max_questions: usize) -> Vec<ProposedQuestion> {
    let items = match recover_json(raw) {
        Some(Value::Object(mut map)) => match map.remove("questions") {
            Some(Value::Array(items)) => items,
            _ => Vec::new(),
        },
        Some(Value::Array(items)) => items,
        _ => {
            warn!("Question payload unreadable, no questions proposed");
            Vec::new()
        }
    };
    items
        .iter()
        .filter_map(parse_question)
        .take(max_questions)
        .collect()
}

/// Parse a classifier payload into raw findings
///
/// Accepts a bare array or an object with `findings` or `predictions`.
pub fn parse_image_findings(raw: &str) -> Vec<Finding> {
    let items = match serde_json::from_str::<Value>(raw.trim()).ok().or_else(|| recover_json(raw)) {
        Some(Value::Array(items)) => items,
        Some(Value::Object(mut map)) => match map.remove("findings").or_else(|| map.remove("predictions")) {
            Some(Value::Array(items)) => items,
            _ => Vec::new(),
        },
        _ => {
            warn!("Classifier payload unreadable, no image findings");
            Vec::new()
        }
    };
    findings_from_values(&items)
}

/// Retrieved context as plain text, cut to `max_chars` characters
///
/// A JSON payload contributes its `context` string or its array of strings
/// (or `{"text": ...}` objects); anything else is used verbatim.
pub fn parse_context(raw: &str, max_chars: usize) -> String {
    let text = match serde_json::from_str::<Value>(raw.trim()) {
        Ok(Value::Object(map)) => map
            .get("context")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_default(),
        Ok(Value::Array(items)) => items
            .iter()
            .filter_map(|item| {
                item.as_str()
                    .or_else(|| item.get("text").and_then(Value::as_str))
            })
            .collect::<Vec<_>>()
            .join("\n\n"),
        Ok(Value::String(s)) => s,
        _ => raw.trim().to_string(),
    };
    text.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_recover_from_code_fence_and_prose() {
        let fenced = "```json\n{\"a\": 1}\n```";
        assert_eq!(recover_json(fenced), Some(json!({"a": 1})));
        let prose = "Sure! Here it is: {\"a\": {\"b\": 2}} hope that helps";
        assert_eq!(recover_json(prose), Some(json!({"a": {"b": 2}})));
        assert_eq!(recover_json("no json here"), None);
        assert_eq!(recover_json("} backwards {"), None);
    }

    #[test]
    fn test_parse_nested_extraction() {
        let raw = r#"{"extracted": {"chief_complaint": "cough", "symptoms": ["fever", ""], "duration": "3 days", "possible_pmh": "asthma"}, "retrieval_query": "cough fever"}"#;
        let e = parse_extraction(raw, "dialogue");
        assert_eq!(e.chief_complaint, "cough");
        assert_eq!(e.symptoms, vec!["fever"]);
        assert_eq!(e.duration.as_deref(), Some("3 days"));
        assert_eq!(e.possible_pmh, vec!["asthma"]);
        assert!(e.possible_meds.is_empty());
        assert_eq!(e.retrieval_query, "cough fever");
    }

    #[test]
    fn test_unreadable_extraction_is_neutral() {
        let e = parse_extraction("the model refused", "I feel dizzy");
        assert_eq!(e, Extraction::neutral("I feel dizzy"));
    }

    #[test]
    fn test_blood_pressure_readings_appended_once() {
        let raw = r#"{"symptoms": ["BP 150/95"]}"#;
        let e = parse_extraction(raw, "bp 150/95 earlier, now 182/115");
        assert_eq!(e.symptoms, vec!["BP 150/95", "bp 182/115"]);
    }

    #[test]
    fn test_question_guardrails() {
        let raw = r#"{"questions": [
            {"q": "Does the pain radiate to your arm?", "priority": "red-flag", "targets": ["a","b","c","d"], "info_gain": 1.7, "why": "ACS"},
            {"q": "   "},
            {"q": "Did you take aspirin today?"},
            {"q": "Should we start antibiotics?"},
            {"q": "Any recent travel?", "priority": "urgent", "info_gain": "0.3"},
            {"q": "Is the cough productive?"}
        ]}"#;
        let questions = parse_questions(raw, 4);
        assert_eq!(questions.len(), 3);
        assert_eq!(questions[0].priority, QuestionPriority::RedFlag);
        assert_eq!(questions[0].targets.len(), 3);
        assert_eq!(questions[0].info_gain, 1.0);
        assert_eq!(questions[1].priority, QuestionPriority::Detail);
        assert_eq!(questions[1].info_gain, 0.3);
        assert_eq!(questions[2].info_gain, DEFAULT_INFO_GAIN);
    }

    #[test]
    fn test_prescriptive_check_uses_whole_words() {
        // "started" and "milligrams" are not banned tokens; "mg" is
        assert!(!is_prescriptive("When had the symptoms started?"));
        assert!(is_prescriptive("How many mg per day?"));
        assert!(is_prescriptive("Can we DIAGNOSE this?"));
    }

    #[test]
    fn test_question_cap_and_why_length() {
        let long_why = "x".repeat(500);
        let items: Vec<Value> = (0..10)
            .map(|i| json!({"q": format!("Question {}?", i), "why": long_why}))
            .collect();
        let questions = parse_questions(&Value::Array(items).to_string(), 4);
        assert_eq!(questions.len(), 4);
        assert_eq!(questions[0].why.chars().count(), MAX_WHY_CHARS);
    }

    #[test]
    fn test_dropped_questions_free_capped_slots() {
        let raw = r#"[
            {"q": "Take ibuprofen?"},
            {"q": "What dose are you on?"},
            {"q": "Any fever?"},
            {"q": "Any night sweats?"}
        ]"#;
        let kept: Vec<String> = parse_questions(raw, 2).into_iter().map(|q| q.q).collect();
        assert_eq!(kept, vec!["Any fever?".to_string(), "Any night sweats?".to_string()]);
    }

    #[test]
    fn test_unreadable_questions_are_empty() {
        assert!(parse_questions("timeout", 4).is_empty());
        assert!(parse_questions(r#"{"questions": "none"}"#, 4).is_empty());
    }

    #[test]
    fn test_image_findings_shapes() {
        let bare = r#"[{"label": "Cardiomegaly", "prob": 0.8}, {"label": "Edema"}]"#;
        assert_eq!(parse_image_findings(bare), vec![Finding::new("Cardiomegaly", 0.8)]);
        let wrapped = r#"{"predictions": [{"label": "Edema", "score": 0.4}]}"#;
        assert_eq!(parse_image_findings(wrapped), vec![Finding::new("Edema", 0.4)]);
        assert!(parse_image_findings("garbage").is_empty());
    }

    #[test]
    fn test_context_is_flattened_and_clipped() {
        assert_eq!(parse_context(r#"{"context": "abcdef"}"#, 3), "abc");
        assert_eq!(parse_context(r#"["one", {"text": "two"}]"#, 100), "one\n\ntwo");
        assert_eq!(parse_context("  plain text ", 100), "plain text");
        assert_eq!(parse_context("", 100), "");
    }
}
