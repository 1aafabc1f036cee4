//! Route definitions for the submission endpoints.

use axum::routing::post;
use axum::Router;

use crate::handlers::encryption;
use crate::state::AppState;

/// ```text
/// POST /encrypt  -> submit_encrypt
/// POST /decrypt  -> submit_decrypt
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/encrypt", post(encryption::submit_encrypt))
        .route("/decrypt", post(encryption::submit_decrypt))
}
