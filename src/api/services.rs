use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use bytes::Bytes;
use serde::de::DeserializeOwned;
use std::path::PathBuf;
use tracing::info;
use uuid::Uuid;

use super::{
    error::ApiError,
    models::{
        BundleRequest, BundleResponse, HealthResponse, LedgerQuery, MessageResponse, SendFileRequest,
        SendFileResponse,
    },
    state::AppState,
};
use crate::config::Config;
use crate::ledger::LedgerEntry;

/// Bodies are parsed by hand so malformed JSON gets the API error shape
fn parse_body<T: DeserializeOwned>(body: &Bytes) -> Result<T, ApiError> {
    if body.is_empty() {
        return Err(ApiError::InvalidPayload("request body is empty".into()));
    }
    Ok(serde_json::from_slice(body)?)
}

/// Liveness (GET /health)
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let status = state.controller.status().await;
    Json(HealthResponse {
        status: "healthy".to_string(),
        active: status.active,
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// GET /api/relay-status/
pub async fn relay_status(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.controller.status().await)
}

/// Loaded configuration with credentials masked (GET /api/relay-config/)
pub async fn get_relay_config(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    state
        .controller
        .safe_config()
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("No configuration loaded".into()))
}

/// Validate and hot-swap a configuration (POST /api/relay-config/)
///
/// A running relay is restarted on the new configuration; a stopped one
/// only has it loaded.
pub async fn update_relay_config(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let value: serde_json::Value = parse_body(&body)?;
    let config = Config::from_json(value).map_err(|e| ApiError::InvalidPayload(e.to_string()))?;

    let status = state.controller.reconfigure(config).await?;
    info!(active = status.active, destinations = status.destinations_count, "Relay configuration updated");

    Ok(Json(MessageResponse {
        message: "Configuration updated".to_string(),
        body: status,
    }))
}

/// POST /api/relay-start/
pub async fn relay_start(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let status = state.controller.start(None).await?;
    Ok(Json(MessageResponse {
        message: "File relay system started".to_string(),
        body: status,
    }))
}

/// POST /api/relay-stop/
pub async fn relay_stop(State(state): State<AppState>) -> impl IntoResponse {
    let report = state.controller.stop().await;
    let message = if report.was_running {
        "File relay system stopped"
    } else {
        "File relay system was not running"
    };
    Json(MessageResponse {
        message: message.to_string(),
        body: report,
    })
}

/// Relay one file that already exists on this host (POST /api/send-file/)
///
/// Returns 202 once the job is queued; the outcome lands in the ledger.
pub async fn send_file(State(state): State<AppState>, body: Bytes) -> Result<impl IntoResponse, ApiError> {
    let request: SendFileRequest = parse_body(&body)?;
    let file_path = request
        .file_path
        .filter(|p| !p.trim().is_empty())
        .ok_or_else(|| ApiError::InvalidPayload("Invalid file path".into()))?;

    let job = state.controller.submit_file(&PathBuf::from(file_path)).await?;

    let response = SendFileResponse {
        message: format!("File {} queued for relay", job.file_name),
        job_id: job.job_id,
        file_name: job.file_name,
        targets: job.resolved_targets,
    };
    Ok((StatusCode::ACCEPTED, Json(response)))
}

/// Relay an already extracted bundle directory (POST /api/relay-bundle/)
pub async fn relay_bundle(State(state): State<AppState>, body: Bytes) -> Result<impl IntoResponse, ApiError> {
    let request: BundleRequest = parse_body(&body)?;
    let bundle_dir = request
        .bundle_dir
        .filter(|p| !p.trim().is_empty())
        .map(PathBuf::from)
        .ok_or_else(|| ApiError::InvalidPayload("bundle_dir is required".into()))?;

    let report = state.controller.relay_bundle(&bundle_dir).await?;
    Ok((StatusCode::ACCEPTED, Json(BundleResponse { bundle_dir, report })))
}

/// Most recent ledger entries, newest first (GET /api/ledger/)
pub async fn list_ledger(
    State(state): State<AppState>,
    Query(query): Query<LedgerQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let entries: Vec<LedgerEntry> = match state.controller.ledger() {
        Some(ledger) => ledger
            .recent(query.limit())
            .map_err(|e| ApiError::Internal(format!("Failed to list ledger: {e}")))?,
        None => Vec::new(),
    };
    Ok(Json(entries))
}

/// GET /api/ledger/{job_id}
pub async fn get_ledger_entry(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = Uuid::parse_str(&job_id).map_err(|_| ApiError::InvalidPayload(format!("invalid job id: {job_id}")))?;

    let entry = state
        .controller
        .ledger()
        .map(|ledger| ledger.get(&id))
        .transpose()
        .map_err(|e| ApiError::Internal(format!("Failed to get job: {e}")))?
        .flatten()
        .ok_or_else(|| ApiError::NotFound(format!("job {job_id}")))?;

    Ok(Json(entry))
}
