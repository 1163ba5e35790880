//! Per-case session state

pub mod store;

pub use store::{CaseState, CaseStatus, SessionStore};
