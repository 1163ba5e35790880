//! Event types and the EventBus
//!
//! Every pipeline run publishes its compact summary on the bus; per-case
//! subscribers filter by `case_id`.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Minimal live-display payload derived from the current ranking
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompactSummary {
    /// Leading condition, if any evidence exists
    pub dx: Option<String>,
    /// Top confidence, rounded to 2 decimals
    pub conf: f64,
    /// Alternates as `"condition 0.xx"`
    pub alts: Vec<String>,
    pub next_question: Option<String>,
    pub alerts: SummaryAlerts,
}

/// Alert block of a [`CompactSummary`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryAlerts {
    pub red_flag: bool,
    /// Top1-top2 margin, rounded to 2 decimals
    pub margin: f64,
}

impl CompactSummary {
    /// Summary of a case with no evidence yet
    pub fn empty() -> Self {
        Self {
            dx: None,
            conf: 0.0,
            alts: Vec::new(),
            next_question: None,
            alerts: SummaryAlerts {
                red_flag: false,
                margin: 0.0,
            },
        }
    }
}

/// medfuse event types
///
/// Events are broadcast via EventBus and serialized for SSE transmission.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum MedfuseEvent {
    /// New case registered
    CaseCreated {
        case_id: Uuid,
        /// Number of imaging findings attached at creation
        image_finding_count: usize,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Pipeline run finished for a case
    CaseUpdated {
        case_id: Uuid,
        /// Utterances in the history the run was computed over
        utterance_count: usize,
        summary: CompactSummary,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A collaborator call failed or timed out and a neutral result was used
    CollaboratorDegraded {
        case_id: Option<Uuid>,
        collaborator: String,
        reason: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl MedfuseEvent {
    /// Event name used as the SSE `event:` field
    pub fn event_type(&self) -> &str {
        match self {
            MedfuseEvent::CaseCreated { .. } => "CaseCreated",
            MedfuseEvent::CaseUpdated { .. } => "CaseUpdated",
            MedfuseEvent::CollaboratorDegraded { .. } => "CollaboratorDegraded",
        }
    }
}

/// Broadcast bus shared by the pipeline and SSE handlers
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<MedfuseEvent>,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// Slow receivers lag (and skip) once `capacity` events are buffered.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<MedfuseEvent> {
        self.tx.subscribe()
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: MedfuseEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}
