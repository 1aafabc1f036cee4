pub mod encryption;
pub mod health;
pub mod jobs;

use axum::Router;

use crate::state::AppState;

/// All routes mounted under `/api/v1`.
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .merge(encryption::router())
        .merge(jobs::router())
}
