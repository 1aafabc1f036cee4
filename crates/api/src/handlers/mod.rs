pub mod encryption;
pub mod jobs;

use axum::http::HeaderMap;
use uuid::Uuid;

use shield_core::types::OwnerId;

use crate::error::AppError;

/// Header carrying the submitting principal's id.
///
/// Stands in for real authentication: the id is recorded on submission
/// and must match on result/key access. An auth middleware would replace
/// this with a verified identity.
pub const OWNER_HEADER: &str = "x-owner-id";

/// Extract the optional owner id from request headers.
pub fn owner_from_headers(headers: &HeaderMap) -> Result<Option<OwnerId>, AppError> {
    let Some(value) = headers.get(OWNER_HEADER) else {
        return Ok(None);
    };
    let value = value
        .to_str()
        .map_err(|_| AppError::BadRequest(format!("{OWNER_HEADER} header is not valid text")))?;
    Uuid::parse_str(value)
        .map(Some)
        .map_err(|_| AppError::BadRequest(format!("{OWNER_HEADER} header is not a valid UUID")))
}
