//! Server-Sent Events (SSE) streams
//!
//! - `GET /cases/:id/events`: the case's cached summary, then every later one
//! - `GET /events`: every engine event

use crate::error::ApiResult;
use crate::AppState;
use axum::{
    extract::{Path, State},
    response::sse::{Event, Sse},
};
use futures::stream::Stream;
use medfuse_common::sse::{event_frame, keep_alive, summary_frame, HEARTBEAT_INTERVAL};
use std::convert::Infallible;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// GET /cases/:id/events
pub async fn case_event_stream(
    State(state): State<AppState>,
    Path(case_id): Path<Uuid>,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let mut subscription = state.pipeline.subscribe(case_id).await?;
    info!(case_id = %case_id, "New SSE client connected to case summaries");

    let stream = async_stream::stream! {
        if let Some(frame) = summary_frame(&subscription.initial) {
            yield Ok(frame);
        }

        loop {
            tokio::select! {
                _ = tokio::time::sleep(HEARTBEAT_INTERVAL) => {
                    debug!("SSE: Sending heartbeat");
                    yield Ok(Event::default().comment("heartbeat"));
                }

                next = subscription.next() => {
                    match next {
                        Some(summary) => {
                            if let Some(frame) = summary_frame(&summary) {
                                yield Ok(frame);
                            }
                        }
                        None => {
                            info!(case_id = %case_id, "SSE: Event bus closed, ending case stream");
                            break;
                        }
                    }
                }
            }
        }
    };

    Ok(Sse::new(stream).keep_alive(keep_alive()))
}

/// GET /events
pub async fn event_stream(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    info!("New SSE client connected to engine events");
    let mut rx = state.event_bus.subscribe();

    let stream = async_stream::stream! {
        loop {
            tokio::select! {
                _ = tokio::time::sleep(HEARTBEAT_INTERVAL) => {
                    debug!("SSE: Sending heartbeat");
                    yield Ok(Event::default().comment("heartbeat"));
                }

                received = rx.recv() => {
                    match received {
                        Ok(event) => {
                            if let Some(frame) = event_frame(&event) {
                                debug!("SSE: Broadcasting event: {}", event.event_type());
                                yield Ok(frame);
                            }
                        }
                        Err(RecvError::Lagged(skipped)) => {
                            warn!(skipped, "SSE: Client lagged, events skipped");
                        }
                        Err(RecvError::Closed) => break,
                    }
                }
            }
        }
    };

    Sse::new(stream).keep_alive(keep_alive())
}
