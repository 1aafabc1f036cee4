use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use shield_service::ServiceError;

/// Application-level error type for HTTP handlers.
///
/// Wraps [`ServiceError`] for domain errors and adds HTTP-specific
/// variants. Implements [`IntoResponse`] to produce consistent JSON
/// error responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// A domain-level error from the job service.
    #[error(transparent)]
    Service(#[from] ServiceError),

    /// A bad request with a human-readable message.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// An internal error with a human-readable message.
    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::Service(service) => match service {
                ServiceError::InvalidParams(msg) => {
                    (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone())
                }
                ServiceError::ArtifactTooLarge { .. } => (
                    StatusCode::PAYLOAD_TOO_LARGE,
                    "PAYLOAD_TOO_LARGE",
                    service.to_string(),
                ),
                ServiceError::NotFound => (
                    StatusCode::NOT_FOUND,
                    "NOT_FOUND",
                    "Job or key not found".to_string(),
                ),
                ServiceError::NotReady { status } => (
                    StatusCode::CONFLICT,
                    "NOT_READY",
                    format!("Job is not completed yet (status: {status})"),
                ),
                ServiceError::Forbidden => (
                    StatusCode::FORBIDDEN,
                    "FORBIDDEN",
                    "You do not have access to this job".to_string(),
                ),
                ServiceError::StorageFailure(msg) => {
                    tracing::error!(error = %msg, "Storage failure");
                    (
                        StatusCode::SERVICE_UNAVAILABLE,
                        "STORAGE_UNAVAILABLE",
                        "Persistent storage is temporarily unavailable".to_string(),
                    )
                }
                ServiceError::Internal(msg) => {
                    tracing::error!(error = %msg, "Internal service error");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "INTERNAL_ERROR",
                        "An internal error occurred".to_string(),
                    )
                }
            },

            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            AppError::InternalError(msg) => {
                tracing::error!(error = %msg, "Internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal error occurred".to_string(),
                )
            }
        };

        let body = json!({
            "error": message,
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}
