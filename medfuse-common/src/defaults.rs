//! Built-in label tables (chest-focused)
//!
//! Used when the TOML file does not provide a `[tables]` section.

use std::collections::BTreeMap;

fn owned_map(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn owned_lists(pairs: Vec<(&str, Vec<&str>)>) -> BTreeMap<String, Vec<String>> {
    pairs
        .into_iter()
        .map(|(k, vs)| (k.to_string(), vs.into_iter().map(String::from).collect()))
        .collect()
}

/// CheXpert-style imaging labels that map onto a named condition
///
/// Labels absent here are canonicalized as-is (e.g. `Cardiomegaly` →
/// `cardiomegaly`).
pub(crate) fn aliases() -> BTreeMap<String, String> {
    owned_map(&[
        ("Consolidation", "pneumonia_unspecified"),
        ("Pneumonia", "pneumonia_unspecified"),
        ("Lung Opacity", "pneumonia_unspecified"),
        ("Edema", "heart_failure_suspected"),
        ("Enlarged Cardiomediastinum", "aortic_emergency_red_flags"),
        ("Pneumothorax", "pneumothorax_red_flags"),
        ("Pleural Effusion", "pleural_effusion"),
        ("Pleural Other", "pleural_effusion"),
        ("Lung Lesion", "lung_lesion"),
        ("Fracture", "rib_fracture"),
        ("Atelectasis", "atelectasis"),
        ("No Finding", "no_acute_finding"),
    ])
}

pub(crate) fn domains() -> BTreeMap<String, Vec<String>> {
    owned_lists(vec![
        (
            "cardiac",
            vec![
                "acute_coronary_syndrome_suspected",
                "heart_failure_suspected",
                "cardiomegaly",
                "arrhythmia_suspected",
                "hypertension_uncontrolled",
            ],
        ),
        (
            "pulmonary",
            vec![
                "pneumonia_unspecified",
                "copd_exacerbation",
                "asthma_exacerbation",
                "bronchitis_acute",
                "lung_lesion",
                "atelectasis",
            ],
        ),
        ("pleural", vec!["pleural_effusion", "pneumothorax_red_flags"]),
        (
            "vascular",
            vec!["pulmonary_embolism_suspected", "aortic_emergency_red_flags"],
        ),
        ("musculoskeletal", vec!["costochondritis", "rib_fracture"]),
        ("gastrointestinal", vec!["gerd"]),
    ])
}

pub(crate) fn keywords() -> BTreeMap<String, Vec<String>> {
    owned_lists(vec![
        (
            "acute_coronary_syndrome_suspected",
            vec!["chest pain", "chest pressure", "radiating to arm", "jaw pain", "diaphoresis"],
        ),
        (
            "heart_failure_suspected",
            vec!["orthopnea", "leg swelling", "ankle swelling", "edema", "paroxysmal nocturnal dyspnea"],
        ),
        ("cardiomegaly", vec!["enlarged heart"]),
        ("arrhythmia_suspected", vec!["palpitations", "irregular heartbeat", "racing heart"]),
        ("hypertension_uncontrolled", vec!["high blood pressure", "hypertension"]),
        (
            "pneumonia_unspecified",
            vec!["pneumonia", "fever", "productive cough", "sputum", "chills"],
        ),
        ("copd_exacerbation", vec!["copd", "emphysema", "smoker's cough"]),
        ("asthma_exacerbation", vec!["asthma", "wheezing", "inhaler"]),
        ("bronchitis_acute", vec!["bronchitis", "cough"]),
        ("lung_lesion", vec!["hemoptysis", "weight loss", "night sweats"]),
        ("pleural_effusion", vec!["pleuritic", "pleural effusion"]),
        (
            "pneumothorax_red_flags",
            vec!["sudden shortness of breath", "collapsed lung", "pneumothorax"],
        ),
        (
            "pulmonary_embolism_suspected",
            vec!["calf pain", "recent surgery", "long flight", "blood clot"],
        ),
        (
            "aortic_emergency_red_flags",
            vec!["tearing pain", "ripping pain", "pain radiating to back"],
        ),
        ("costochondritis", vec!["tender to touch", "pain on palpation"]),
        ("rib_fracture", vec!["fall", "trauma", "rib pain"]),
        ("gerd", vec!["heartburn", "acid reflux", "burning after meals"]),
    ])
}

pub(crate) fn synonyms() -> BTreeMap<String, String> {
    owned_map(&[
        ("mi", "acute_coronary_syndrome_suspected"),
        ("heart attack", "acute_coronary_syndrome_suspected"),
        ("chf", "heart_failure_suspected"),
        ("pe", "pulmonary_embolism_suspected"),
        ("reflux", "gerd"),
        ("htn", "hypertension_uncontrolled"),
    ])
}

pub(crate) fn critical_conditions() -> Vec<String> {
    [
        "acute_coronary_syndrome_suspected",
        "stroke_suspected",
        "pulmonary_embolism_suspected",
        "aortic_emergency_red_flags",
        "pneumothorax_red_flags",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}
