//! Case endpoints
//!
//! - `POST /cases` with pre-classified findings
//! - `POST /cases/image` with a raw image body
//! - `POST /cases/:id/utterances`
//! - `GET /cases/:id`

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use medfuse_common::events::CompactSummary;
use medfuse_common::Error;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;
use uuid::Uuid;

use crate::error::ApiResult;
use crate::session::CaseState;
use crate::types::findings_from_values;
use crate::workflow::CreatedCase;
use crate::AppState;

/// POST /cases request
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CreateCaseRequest {
    /// Raw classifier output: `[{"label", "score"|"prob"}]`
    pub image_findings: Vec<Value>,
    pub patient_id: Option<String>,
}

/// POST /cases/image query parameters
#[derive(Debug, Default, Deserialize)]
pub struct ImageCaseQuery {
    pub filename: Option<String>,
    pub patient_id: Option<String>,
}

/// POST /cases/:id/utterances request
#[derive(Debug, Deserialize)]
pub struct UtteranceRequest {
    pub text: String,
    #[serde(default)]
    pub speaker: Option<String>,
}

/// POST /cases/:id/utterances response
#[derive(Debug, Serialize)]
pub struct UtteranceResponse {
    pub case_id: Uuid,
    pub compact_summary: CompactSummary,
}

/// POST /cases
pub async fn create_case(
    State(state): State<AppState>,
    Json(request): Json<CreateCaseRequest>,
) -> ApiResult<(StatusCode, Json<CreatedCase>)> {
    let findings = findings_from_values(&request.image_findings);
    info!(findings = findings.len(), "Create case request");
    let created = state
        .pipeline
        .create_case_with_findings(findings, request.patient_id.as_deref())
        .await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// POST /cases/image
pub async fn create_case_from_image(
    State(state): State<AppState>,
    Query(query): Query<ImageCaseQuery>,
    body: Bytes,
) -> ApiResult<(StatusCode, Json<CreatedCase>)> {
    if body.is_empty() {
        return Err(Error::InvalidInput("Image body is empty".to_string()).into());
    }
    info!(bytes = body.len(), filename = ?query.filename, "Create case from image");
    let created = state
        .pipeline
        .create_case(
            Some(body.as_ref()),
            query.filename.as_deref(),
            query.patient_id.as_deref(),
        )
        .await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// POST /cases/:id/utterances
///
/// Unknown case → 404 before blank text → 400.
pub async fn submit_utterance(
    State(state): State<AppState>,
    Path(case_id): Path<Uuid>,
    Json(request): Json<UtteranceRequest>,
) -> ApiResult<Json<UtteranceResponse>> {
    let compact_summary = state
        .pipeline
        .submit_utterance(case_id, &request.text, request.speaker.as_deref())
        .await?;
    Ok(Json(UtteranceResponse {
        case_id,
        compact_summary,
    }))
}

/// GET /cases/:id
pub async fn get_case(
    State(state): State<AppState>,
    Path(case_id): Path<Uuid>,
) -> ApiResult<Json<CaseState>> {
    Ok(Json(state.pipeline.snapshot(case_id).await?))
}

/// Build case routes
pub fn case_routes() -> Router<AppState> {
    Router::new()
        .route("/cases", post(create_case))
        .route("/cases/image", post(create_case_from_image))
        .route("/cases/:id", get(get_case))
        .route("/cases/:id/utterances", post(submit_utterance))
}
