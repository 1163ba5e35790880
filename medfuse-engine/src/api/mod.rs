//! HTTP API handlers for medfuse-engine
//!
//! REST endpoints for case creation, utterance submission and the EHR
//! directory, plus SSE streams of compact summaries and engine events.

pub mod cases;
pub mod ehr;
pub mod health;
pub mod sse;

pub use cases::case_routes;
pub use ehr::ehr_routes;
pub use health::health_routes;
pub use sse::{case_event_stream, event_stream};
