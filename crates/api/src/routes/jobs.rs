//! Route definitions for the `/jobs` resource.

use axum::routing::get;
use axum::Router;

use crate::handlers::jobs;
use crate::state::AppState;

/// ```text
/// GET /jobs/{id}         -> get_job
/// GET /jobs/{id}/result  -> get_job_result
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/jobs/{id}", get(jobs::get_job))
        .route("/jobs/{id}/result", get(jobs::get_job_result))
}
