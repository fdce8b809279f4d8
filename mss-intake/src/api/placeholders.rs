//! Placeholder endpoints
//!
//! - `POST /api/placeholders`: get or create the pending placeholder for the
//!   caller's tenant and the given subject/task
//! - `GET /api/placeholders/history`: every generation for a subject/task
//! - `GET /api/placeholders/:id`
//! - `POST /api/placeholders/:id/finalize`
//! - `POST /api/placeholders/:id/abandon`
//!
//! Placeholders belonging to another tenant are reported as not found.

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::session::SessionContext;
use crate::admission::{AdmissionOutcome, PlaceholderId, PlaceholderRecord, PlaceholderStatus};
use crate::error::{ApiError, ApiResult};
use crate::utils::retry_transient;
use crate::AppState;

/// Request body for `POST /api/placeholders`
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreatePlaceholderRequest {
    #[serde(default)]
    pub subject_id: Option<i64>,
    #[serde(default)]
    pub task_id: Option<i64>,
    /// Stored only if this request creates the placeholder
    #[serde(default)]
    pub payload: Option<serde_json::Value>,
}

/// Response for `POST /api/placeholders`
#[derive(Debug, Serialize)]
pub struct CreatePlaceholderResponse {
    pub id: PlaceholderId,
    pub outcome: AdmissionOutcome,
    pub generation: u32,
    pub status: PlaceholderStatus,
}

/// Query for `GET /api/placeholders/history`
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HistoryQuery {
    pub subject_id: Option<i64>,
    pub task_id: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub records: Vec<PlaceholderRecord>,
}

/// POST /api/placeholders
///
/// 201 when a placeholder was created, 200 when an existing pending one was
/// returned. Transient storage failures are retried within
/// `intake_max_retry_wait_ms` before surfacing as 503.
pub async fn create_placeholder(
    State(state): State<AppState>,
    session: SessionContext,
    body: Result<Json<CreatePlaceholderRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<CreatePlaceholderResponse>)> {
    let Json(request) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let context = session.submission(request.subject_id, request.task_id)?;
    let payload = request
        .payload
        .unwrap_or_else(|| serde_json::Value::Object(Default::default()));

    let admission = retry_transient("placeholder admission", state.max_retry_wait_ms, || {
        state.service.get_or_create(&context, payload.clone())
    })
    .await?;

    let status = match admission.outcome {
        AdmissionOutcome::Created => StatusCode::CREATED,
        AdmissionOutcome::Reused => StatusCode::OK,
    };

    Ok((
        status,
        Json(CreatePlaceholderResponse {
            id: admission.id,
            outcome: admission.outcome,
            generation: admission.generation,
            status: PlaceholderStatus::Pending,
        }),
    ))
}

/// GET /api/placeholders/:id
pub async fn get_placeholder(
    State(state): State<AppState>,
    session: SessionContext,
    Path(id): Path<String>,
) -> ApiResult<Json<PlaceholderRecord>> {
    let record = load_owned(&state, &session, &id).await?;
    Ok(Json(record))
}

/// POST /api/placeholders/:id/finalize
pub async fn finalize_placeholder(
    State(state): State<AppState>,
    session: SessionContext,
    Path(id): Path<String>,
) -> ApiResult<Json<PlaceholderRecord>> {
    let record = load_owned(&state, &session, &id).await?;
    Ok(Json(state.service.finalize(record.id).await?))
}

/// POST /api/placeholders/:id/abandon
pub async fn abandon_placeholder(
    State(state): State<AppState>,
    session: SessionContext,
    Path(id): Path<String>,
) -> ApiResult<Json<PlaceholderRecord>> {
    let record = load_owned(&state, &session, &id).await?;
    Ok(Json(state.service.abandon(record.id).await?))
}

/// GET /api/placeholders/history?subject_id=..&task_id=..
pub async fn placeholder_history(
    State(state): State<AppState>,
    session: SessionContext,
    query: Result<Query<HistoryQuery>, QueryRejection>,
) -> ApiResult<Json<HistoryResponse>> {
    let Query(query) = query.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let context = session.submission(query.subject_id, query.task_id)?;
    let records = state.service.history(&context).await?;
    Ok(Json(HistoryResponse { records }))
}

/// Fetch a placeholder, hiding records of other tenants.
async fn load_owned(
    state: &AppState,
    session: &SessionContext,
    raw_id: &str,
) -> ApiResult<PlaceholderRecord> {
    let id: PlaceholderId = raw_id
        .parse()
        .map_err(|_| ApiError::BadRequest(format!("Invalid placeholder id: {}", raw_id)))?;

    let record = state.service.get(id).await?;
    if !session.owns(&record) {
        debug!(%id, tenant_id = session.tenant_id(), "Placeholder belongs to another tenant");
        return Err(ApiError::NotFound(format!("placeholder not found: {}", id)));
    }
    Ok(record)
}

/// Build placeholder routes
pub fn placeholder_routes() -> Router<AppState> {
    Router::new()
        .route("/api/placeholders", post(create_placeholder))
        .route("/api/placeholders/history", get(placeholder_history))
        .route("/api/placeholders/:id", get(get_placeholder))
        .route("/api/placeholders/:id/finalize", post(finalize_placeholder))
        .route("/api/placeholders/:id/abandon", post(abandon_placeholder))
}
