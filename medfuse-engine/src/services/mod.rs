//! Service modules for the live evidence pipeline
//!
//! Stateless decision components run on every pipeline pass, plus the EHR
//! directory consulted once at case creation.

pub mod confidence;
pub mod domain_bucketer;
pub mod ehr_directory;
pub mod question_gate;
pub mod red_flags;

pub use confidence::{confidence_and_margin, scope_hint, ScopeHint};
pub use domain_bucketer::{DomainBucketMap, DomainBucketer};
pub use ehr_directory::{BindingSource, EhrBinding, EhrDirectory, EhrRecord, VitalSigns};
pub use question_gate::{GateDecision, QuestionGate};
pub use red_flags::{RedFlag, RedFlagDetector};
