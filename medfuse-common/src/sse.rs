//! Server-Sent Events (SSE) utilities
//!
//! Shared conversions from bus events to SSE frames.

use crate::events::{CompactSummary, MedfuseEvent};
use axum::response::sse::{Event, KeepAlive};
use std::time::Duration;
use tracing::warn;

/// Heartbeat interval for every SSE stream
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Keep-alive configuration shared by all SSE endpoints
pub fn keep_alive() -> KeepAlive {
    KeepAlive::new().interval(HEARTBEAT_INTERVAL).text("heartbeat")
}

/// Serialize a bus event into an SSE frame named after its type
///
/// Returns `None` (and logs) if serialization fails.
pub fn event_frame(event: &MedfuseEvent) -> Option<Event> {
    let event_type = event.event_type();
    match serde_json::to_string(event) {
        Ok(json) => Some(Event::default().event(event_type).data(json)),
        Err(e) => {
            warn!("SSE: Failed to serialize event {}: {}", event_type, e);
            None
        }
    }
}

/// Serialize a compact summary into a `summary` SSE frame
pub fn summary_frame(summary: &CompactSummary) -> Option<Event> {
    match serde_json::to_string(summary) {
        Ok(json) => Some(Event::default().event("summary").data(json)),
        Err(e) => {
            warn!("SSE: Failed to serialize summary: {}", e);
            None
        }
    }
}
