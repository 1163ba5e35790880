//! Live update workflow
//!
//! One pipeline run per event: extraction → normalization and text scanning →
//! fusion → confidence → domain bucketing → question gating → compact summary.

pub mod pipeline;
pub mod summary;

pub use pipeline::{CaseSubscription, CreatedCase, LivePipeline};
pub use summary::build_summary;
