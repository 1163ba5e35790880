//! EHR directory endpoints
//!
//! - `GET /ehr/patients`
//! - `GET /ehr/patients/:id`
//! - `POST /reload_ehr`

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tracing::info;

use crate::error::{ApiError, ApiResult};
use crate::services::EhrRecord;
use crate::AppState;

/// GET /ehr/patients response
#[derive(Debug, Serialize)]
pub struct PatientListResponse {
    pub patients: Vec<EhrRecord>,
    pub total: usize,
}

/// GET /ehr/patients/:id response
#[derive(Debug, Serialize)]
pub struct PatientResponse {
    pub patient: EhrRecord,
}

/// POST /reload_ehr response
#[derive(Debug, Serialize)]
pub struct ReloadResponse {
    pub ehr_loaded: usize,
    pub ehr_source: Option<String>,
}

/// GET /ehr/patients
pub async fn list_patients(State(state): State<AppState>) -> Json<PatientListResponse> {
    let patients = state.pipeline.ehr_records().await;
    Json(PatientListResponse {
        total: patients.len(),
        patients,
    })
}

/// GET /ehr/patients/:id
pub async fn get_patient(
    State(state): State<AppState>,
    Path(patient_id): Path<String>,
) -> ApiResult<Json<PatientResponse>> {
    let patient = state
        .pipeline
        .ehr_record(&patient_id)
        .await
        .ok_or_else(|| ApiError::NotFound(format!("Patient not found: {}", patient_id)))?;
    Ok(Json(PatientResponse { patient }))
}

/// POST /reload_ehr
pub async fn reload_ehr(State(state): State<AppState>) -> ApiResult<Json<ReloadResponse>> {
    let ehr_loaded = state.pipeline.reload_ehr().await?;
    info!(records = ehr_loaded, "EHR reload requested");
    Ok(Json(ReloadResponse {
        ehr_loaded,
        ehr_source: state
            .config
            .collaborators
            .ehr_json
            .as_ref()
            .map(|path| path.display().to_string()),
    }))
}

/// Build EHR routes
pub fn ehr_routes() -> Router<AppState> {
    Router::new()
        .route("/ehr/patients", get(list_patients))
        .route("/ehr/patients/:id", get(get_patient))
        .route("/reload_ehr", post(reload_ehr))
}
