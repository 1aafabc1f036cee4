//! Handlers for the encrypt/decrypt submission endpoints.
//!
//! Both accept a multipart form and return `202 Accepted` with the job
//! id; the transform itself runs asynchronously on the worker pool and is
//! observed via the jobs endpoints.

use axum::extract::{Multipart, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;

use shield_core::types::JobId;
use shield_service::{SubmitKind, SubmitRequest};

use crate::error::{AppError, AppResult};
use crate::handlers::owner_from_headers;
use crate::response::DataResponse;
use crate::state::AppState;

/// Response payload for a submission.
#[derive(Debug, Serialize)]
pub struct SubmittedJob {
    pub job_id: JobId,
}

/// Fallback name when the upload carries no file name.
const DEFAULT_FILE_NAME: &str = "upload.png";

// ---------------------------------------------------------------------------
// POST /encrypt
// ---------------------------------------------------------------------------

/// Submit an image for encryption.
///
/// Multipart fields: `image` (required file), `purity` (optional text,
/// one of `fast`/`balanced`/`maximum`, default `balanced`).
pub async fn submit_encrypt(
    State(state): State<AppState>,
    headers: HeaderMap,
    multipart: Multipart,
) -> AppResult<impl IntoResponse> {
    let owner_id = owner_from_headers(&headers)?;
    let mut form = read_form(multipart, "image", &["purity"]).await?;

    let (file_name, bytes) = form
        .file
        .take()
        .ok_or_else(|| AppError::BadRequest("Image file required".into()))?;

    let job_id = state
        .service
        .submit(SubmitRequest {
            kind: SubmitKind::Encrypt {
                purity: form.text.remove("purity"),
            },
            file_name,
            bytes,
            owner_id,
        })
        .await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(DataResponse {
            data: SubmittedJob { job_id },
        }),
    ))
}

// ---------------------------------------------------------------------------
// POST /decrypt
// ---------------------------------------------------------------------------

/// Submit an encrypted image for decryption.
///
/// Multipart fields: `encrypted_image` (required file), `key_id`
/// (required text, the key reference returned by the encrypt job).
pub async fn submit_decrypt(
    State(state): State<AppState>,
    headers: HeaderMap,
    multipart: Multipart,
) -> AppResult<impl IntoResponse> {
    let owner_id = owner_from_headers(&headers)?;
    let mut form = read_form(multipart, "encrypted_image", &["key_id"]).await?;

    let (file_name, bytes) = form
        .file
        .take()
        .ok_or_else(|| AppError::BadRequest("Encrypted image file required".into()))?;
    let key_id = form
        .text
        .remove("key_id")
        .ok_or_else(|| AppError::BadRequest("key_id field required".into()))?;

    let job_id = state
        .service
        .submit(SubmitRequest {
            kind: SubmitKind::Decrypt { key_id },
            file_name,
            bytes,
            owner_id,
        })
        .await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(DataResponse {
            data: SubmittedJob { job_id },
        }),
    ))
}

// ---------------------------------------------------------------------------
// Multipart plumbing
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Form {
    file: Option<(String, Vec<u8>)>,
    text: std::collections::HashMap<String, String>,
}

/// Drain a multipart body, capturing the named file field and any of the
/// listed text fields. Unknown fields are ignored.
async fn read_form(
    mut multipart: Multipart,
    file_field: &str,
    text_fields: &[&str],
) -> Result<Form, AppError> {
    let mut form = Form::default();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("Malformed multipart body: {e}")))?
    {
        let Some(name) = field.name().map(String::from) else {
            continue;
        };
        if name == file_field {
            let file_name = field
                .file_name()
                .unwrap_or(DEFAULT_FILE_NAME)
                .to_string();
            let bytes = field
                .bytes()
                .await
                .map_err(|e| AppError::BadRequest(format!("Failed to read upload: {e}")))?;
            form.file = Some((file_name, bytes.to_vec()));
        } else if text_fields.contains(&name.as_str()) {
            let value = field
                .text()
                .await
                .map_err(|e| AppError::BadRequest(format!("Failed to read field '{name}': {e}")))?;
            form.text.insert(name, value);
        }
    }
    Ok(form)
}
