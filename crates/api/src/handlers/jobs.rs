//! Handlers for the `/jobs` resource.

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::Json;
use uuid::Uuid;

use crate::error::AppResult;
use crate::handlers::owner_from_headers;
use crate::response::DataResponse;
use crate::state::AppState;

/// GET /jobs/{id}
///
/// Status projection of a job. Safe to poll at any rate.
pub async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<impl IntoResponse> {
    let view = state.service.get_status(id).await?;
    Ok(Json(DataResponse { data: view }))
}

/// GET /jobs/{id}/result
///
/// Result locators of a completed job. Returns 409 while the job is
/// still queued or processing, 403 when the job belongs to another
/// owner.
pub async fn get_job_result(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> AppResult<impl IntoResponse> {
    let owner_id = owner_from_headers(&headers)?;
    let result = state.service.get_result(id, owner_id).await?;
    Ok(Json(DataResponse { data: result }))
}
