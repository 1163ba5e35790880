//! EHR Directory
//!
//! Optional in-memory index of EHR records loaded from a JSON array. Used once
//! per case to resolve `ehr_binding`:
//! 1. explicit patient hint, if the id is known
//! 2. image filename basename matching a record's `xray_path`
//! 3. first record whose `chexpert_label` equals the top image label

use crate::types::Finding;
use medfuse_common::{Error, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::path::Path;
use tracing::{info, warn};

/// Recorded vitals; every field optional
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VitalSigns {
    /// `"systolic/diastolic"`
    pub bp: Option<String>,
    pub hr: Option<f64>,
    pub rr: Option<f64>,
    pub temp_f: Option<f64>,
    pub spo2_pct: Option<f64>,
}

impl VitalSigns {
    /// Parse `bp` into (systolic, diastolic)
    pub fn blood_pressure(&self) -> Option<(u32, u32)> {
        let (systolic, diastolic) = self.bp.as_deref()?.split_once('/')?;
        Some((systolic.trim().parse().ok()?, diastolic.trim().parse().ok()?))
    }
}

/// One EHR record; unknown fields are ignored
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EhrRecord {
    pub patient_id: String,
    pub xray_path: Option<String>,
    pub chexpert_label: Option<String>,
    pub sex: Option<String>,
    pub age: Option<u32>,
    pub vital_signs: Option<VitalSigns>,
    pub pmh: Vec<String>,
    pub meds: Vec<String>,
    pub ehr_notes: Option<String>,
}

impl EhrRecord {
    /// Compact human-readable summary handed to the question proposer
    pub fn summary(&self) -> String {
        let mut parts = vec![format!("EHR patient_id={}", self.patient_id)];
        if self.sex.is_some() || self.age.is_some() {
            parts.push(format!(
                "Demographics: {} {}y",
                self.sex.as_deref().unwrap_or("?"),
                self.age.map(|a| a.to_string()).unwrap_or_else(|| "?".to_string())
            ));
        }
        if let Some(vs) = &self.vital_signs {
            let mut kv = Vec::new();
            if let Some(bp) = &vs.bp {
                kv.push(format!("bp={}", bp));
            }
            for (key, value) in [("hr", vs.hr), ("rr", vs.rr), ("temp_f", vs.temp_f), ("spo2_pct", vs.spo2_pct)] {
                if let Some(v) = value {
                    kv.push(format!("{}={}", key, v));
                }
            }
            if !kv.is_empty() {
                parts.push(format!("Vitals: {}", kv.join(", ")));
            }
        }
        if !self.pmh.is_empty() {
            parts.push(format!("PMH: {}", self.pmh.join(", ")));
        }
        if !self.meds.is_empty() {
            parts.push(format!("Meds: {}", self.meds.join(", ")));
        }
        if let Some(label) = &self.chexpert_label {
            parts.push(format!("CheXpert label (prior): {}", label));
        }
        if let Some(note) = &self.ehr_notes {
            parts.push(format!("Notes: {}", note));
        }
        parts.join("\n")
    }
}

/// How a case was bound to its EHR record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BindingSource {
    PatientHint,
    ImageFilename,
    ImageLabel,
}

/// Association between a case and an EHR record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EhrBinding {
    pub patient_id: String,
    pub source: BindingSource,
}

/// Record index keyed by patient id and image basename
#[derive(Debug, Clone, Default)]
pub struct EhrDirectory {
    records: Vec<EhrRecord>,
    by_patient: HashMap<String, usize>,
    by_image: HashMap<String, usize>,
}

impl EhrDirectory {
    pub fn new(records: Vec<EhrRecord>) -> Self {
        let mut by_patient = HashMap::new();
        let mut by_image = HashMap::new();
        for (i, record) in records.iter().enumerate() {
            if !record.patient_id.is_empty() {
                by_patient.insert(record.patient_id.clone(), i);
            }
            if let Some(name) = record.xray_path.as_deref().and_then(basename) {
                by_image.insert(name.to_string(), i);
            }
        }
        Self {
            records,
            by_patient,
            by_image,
        }
    }

    /// Load from a JSON array file
    ///
    /// A missing or unreadable file yields an empty directory.
    pub fn load(path: &Path) -> Self {
        match Self::try_load(path) {
            Ok(directory) => directory,
            Err(e) => {
                warn!("EHR file {} unavailable, binding disabled: {}", path.display(), e);
                Self::default()
            }
        }
    }

    /// Strict variant of [`load`](Self::load) used for reloads
    pub fn try_load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let records: Vec<EhrRecord> = serde_json::from_str(&content).map_err(|e| {
            Error::Config(format!("EHR file {} is not a record array: {}", path.display(), e))
        })?;
        info!(count = records.len(), "Loaded EHR records from {}", path.display());
        Ok(Self::new(records))
    }

    pub fn records(&self) -> &[EhrRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, patient_id: &str) -> Option<&EhrRecord> {
        self.by_patient.get(patient_id).map(|&i| &self.records[i])
    }

    /// Resolve the binding for a new case
    ///
    /// `image_findings` are the raw (pre-normalization) classifier labels,
    /// which share the `chexpert_label` vocabulary.
    pub fn bind(
        &self,
        patient_hint: Option<&str>,
        filename: Option<&str>,
        image_findings: &[Finding],
    ) -> Option<EhrBinding> {
        if let Some(hint) = patient_hint.map(str::trim).filter(|h| !h.is_empty()) {
            if self.by_patient.contains_key(hint) {
                return Some(EhrBinding {
                    patient_id: hint.to_string(),
                    source: BindingSource::PatientHint,
                });
            }
            warn!(patient_id = %hint, "Patient hint not found in EHR directory");
        }

        if let Some(&i) = filename.and_then(basename).and_then(|name| self.by_image.get(name)) {
            return Some(EhrBinding {
                patient_id: self.records[i].patient_id.clone(),
                source: BindingSource::ImageFilename,
            });
        }

        let top = image_findings
            .iter()
            .max_by(|a, b| a.score.partial_cmp(&b.score).unwrap_or(Ordering::Equal))?;
        self.records
            .iter()
            .find(|r| r.chexpert_label.as_deref() == Some(top.label.as_str()))
            .map(|r| EhrBinding {
                patient_id: r.patient_id.clone(),
                source: BindingSource::ImageLabel,
            })
    }
}

fn basename(path: &str) -> Option<&str> {
    Path::new(path).file_name().and_then(|name| name.to_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn record(patient_id: &str, xray: &str, label: &str) -> EhrRecord {
        EhrRecord {
            patient_id: patient_id.to_string(),
            xray_path: Some(xray.to_string()),
            chexpert_label: Some(label.to_string()),
            ..EhrRecord::default()
        }
    }

    fn directory() -> EhrDirectory {
        EhrDirectory::new(vec![
            record("P001", "/data/xrays/view1.jpg", "Cardiomegaly"),
            record("P002", "/data/xrays/view2.jpg", "Edema"),
            record("P003", "/data/xrays/view3.jpg", "Edema"),
        ])
    }

    #[test]
    fn test_patient_hint_wins() {
        let binding = directory()
            .bind(Some("P003"), Some("view1.jpg"), &[Finding::new("Edema", 0.9)])
            .unwrap();
        assert_eq!(binding.patient_id, "P003");
        assert_eq!(binding.source, BindingSource::PatientHint);
    }

    #[test]
    fn test_unknown_hint_falls_through_to_filename() {
        let binding = directory().bind(Some("P999"), Some("uploads/view2.jpg"), &[]).unwrap();
        assert_eq!(binding.patient_id, "P002");
        assert_eq!(binding.source, BindingSource::ImageFilename);
    }

    #[test]
    fn test_top_label_picks_first_matching_record() {
        let findings = [Finding::new("Cardiomegaly", 0.3), Finding::new("Edema", 0.8)];
        let binding = directory().bind(None, Some("unknown.png"), &findings).unwrap();
        assert_eq!(binding.patient_id, "P002");
        assert_eq!(binding.source, BindingSource::ImageLabel);
    }

    #[test]
    fn test_no_evidence_no_binding() {
        assert!(directory().bind(None, None, &[]).is_none());
        assert!(EhrDirectory::default().bind(Some("P001"), None, &[]).is_none());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[{{"patient_id": "P010", "xray_path": "a/b.jpg", "vital_signs": {{"bp": "150/95", "hr": 88}}, "extra": 1}}]"#
        )
        .unwrap();
        let dir = EhrDirectory::load(file.path());
        assert_eq!(dir.len(), 1);
        let vitals = dir.get("P010").unwrap().vital_signs.clone().unwrap();
        assert_eq!(vitals.blood_pressure(), Some((150, 95)));
        assert_eq!(vitals.hr, Some(88.0));
    }

    #[test]
    fn test_missing_or_malformed_file_gives_empty_directory() {
        assert!(EhrDirectory::load(Path::new("/nonexistent/ehr.json")).is_empty());
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{not json").unwrap();
        assert!(EhrDirectory::load(file.path()).is_empty());
    }

    #[test]
    fn test_strict_load_reports_the_failure() {
        assert!(matches!(
            EhrDirectory::try_load(Path::new("/nonexistent/ehr.json")),
            Err(Error::Io(_))
        ));
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"patient_id": "P001"}}"#).unwrap();
        assert!(matches!(EhrDirectory::try_load(file.path()), Err(Error::Config(_))));
    }

    #[test]
    fn test_records_keep_file_order() {
        let binding = directory();
        let ids: Vec<&str> = binding.records().iter().map(|r| r.patient_id.as_str()).collect();
        assert_eq!(ids, vec!["P001", "P002", "P003"]);
    }

    #[test]
    fn test_summary_lists_available_sections() {
        let mut rec = record("P001", "x.jpg", "Cardiomegaly");
        rec.age = Some(64);
        rec.pmh = vec!["hypertension".to_string()];
        let summary = rec.summary();
        assert!(summary.starts_with("EHR patient_id=P001"));
        assert!(summary.contains("Demographics: ? 64y"));
        assert!(summary.contains("PMH: hypertension"));
        assert!(!summary.contains("Vitals"));
    }
}
