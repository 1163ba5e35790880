//! medfuse-engine library interface
//!
//! Live clinical evidence fusion: image findings and conversational text are
//! fused into a ranked differential that is kept current as utterances arrive.

pub mod api;
pub mod collaborators;
pub mod error;
pub mod fusion;
pub mod services;
pub mod session;
pub mod types;
pub mod workflow;

pub use crate::error::{ApiError, ApiResult};

use axum::Router;
use chrono::{DateTime, Utc};
use medfuse_common::events::EventBus;
use medfuse_common::EngineConfig;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use workflow::LivePipeline;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub pipeline: LivePipeline,
    /// Event bus for SSE broadcasting
    pub event_bus: EventBus,
    pub config: Arc<EngineConfig>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(pipeline: LivePipeline) -> Self {
        Self {
            event_bus: pipeline.event_bus().clone(),
            config: Arc::new(pipeline.config().clone()),
            pipeline,
            startup_time: Utc::now(),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::routing::get;

    Router::new()
        .merge(api::case_routes())
        .merge(api::ehr_routes())
        .route("/cases/:id/events", get(api::case_event_stream))
        .route("/events", get(api::event_stream))
        .merge(api::health_routes())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
