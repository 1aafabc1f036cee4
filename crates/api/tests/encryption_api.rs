//! Integration tests for the submit-encrypt and submit-decrypt endpoints.

mod common;

use axum::http::StatusCode;
use uuid::Uuid;

use common::{body_json, build_test_app, png_bytes, post_multipart, Part, TEST_UPLOAD_LIMIT};
use shield_core::job::{JobStatus, PurityLevel};
use shield_core::store::JobStore;
use shield_core::vault::KeyVault;

#[tokio::test]
async fn submit_encrypt_returns_job_id_and_creates_queued_job() {
    let app = build_test_app();
    let image = png_bytes(1024);

    let response = post_multipart(
        &app.router,
        "/api/v1/encrypt",
        &[
            Part::File {
                name: "image",
                file_name: "photo.png",
                bytes: &image,
            },
            Part::Text {
                name: "purity",
                value: "fast",
            },
        ],
        &[],
    )
    .await;

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let json = body_json(response).await;
    let job_id: Uuid = json["data"]["job_id"]
        .as_str()
        .expect("job_id in response")
        .parse()
        .unwrap();

    let job = app.store.get(job_id).await.unwrap();
    assert_eq!(job.status, JobStatus::Queued);
    assert_eq!(job.params.purity(), Some(PurityLevel::Fast));
}

#[tokio::test]
async fn submit_encrypt_without_image_is_rejected() {
    let app = build_test_app();
    let response = post_multipart(
        &app.router,
        "/api/v1/encrypt",
        &[Part::Text {
            name: "purity",
            value: "fast",
        }],
        &[],
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn submit_encrypt_with_invalid_purity_is_rejected() {
    let app = build_test_app();
    let image = png_bytes(64);

    let response = post_multipart(
        &app.router,
        "/api/v1/encrypt",
        &[
            Part::File {
                name: "image",
                file_name: "photo.png",
                bytes: &image,
            },
            Part::Text {
                name: "purity",
                value: "quantum",
            },
        ],
        &[],
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn oversized_upload_is_rejected_with_413() {
    let app = build_test_app();
    let image = png_bytes(TEST_UPLOAD_LIMIT as usize + 1);

    let response = post_multipart(
        &app.router,
        "/api/v1/encrypt",
        &[Part::File {
            name: "image",
            file_name: "huge.png",
            bytes: &image,
        }],
        &[],
    )
    .await;

    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);

    // Rejected synchronously: no job record was created.
    let queued = app.store.list_by_status(JobStatus::Queued).await.unwrap();
    assert!(queued.is_empty());
}

#[tokio::test]
async fn submit_decrypt_with_known_key_is_accepted() {
    let app = build_test_app();
    let key_id = app
        .vault
        .store(Uuid::new_v4(), None, b"material", None)
        .await
        .unwrap();
    let image = png_bytes(64);

    let response = post_multipart(
        &app.router,
        "/api/v1/decrypt",
        &[
            Part::File {
                name: "encrypted_image",
                file_name: "sealed.png",
                bytes: &image,
            },
            Part::Text {
                name: "key_id",
                value: &key_id.to_string(),
            },
        ],
        &[],
    )
    .await;

    assert_eq!(response.status(), StatusCode::ACCEPTED);
}

#[tokio::test]
async fn submit_decrypt_with_unknown_key_is_404() {
    let app = build_test_app();
    let image = png_bytes(64);

    let response = post_multipart(
        &app.router,
        "/api/v1/decrypt",
        &[
            Part::File {
                name: "encrypted_image",
                file_name: "sealed.png",
                bytes: &image,
            },
            Part::Text {
                name: "key_id",
                value: &Uuid::new_v4().to_string(),
            },
        ],
        &[],
    )
    .await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn submit_decrypt_with_malformed_key_id_is_rejected() {
    let app = build_test_app();
    let image = png_bytes(64);

    let response = post_multipart(
        &app.router,
        "/api/v1/decrypt",
        &[
            Part::File {
                name: "encrypted_image",
                file_name: "sealed.png",
                bytes: &image,
            },
            Part::Text {
                name: "key_id",
                value: "definitely-not-a-uuid",
            },
        ],
        &[],
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn owner_header_is_recorded_on_the_job() {
    let app = build_test_app();
    let owner = Uuid::new_v4();
    let image = png_bytes(64);

    let response = post_multipart(
        &app.router,
        "/api/v1/encrypt",
        &[Part::File {
            name: "image",
            file_name: "photo.png",
            bytes: &image,
        }],
        &[("x-owner-id", &owner.to_string())],
    )
    .await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    let json = body_json(response).await;
    let job_id: Uuid = json["data"]["job_id"].as_str().unwrap().parse().unwrap();
    assert_eq!(app.store.get(job_id).await.unwrap().owner_id, Some(owner));
}

#[tokio::test]
async fn malformed_owner_header_is_rejected() {
    let app = build_test_app();
    let image = png_bytes(64);

    let response = post_multipart(
        &app.router,
        "/api/v1/encrypt",
        &[Part::File {
            name: "image",
            file_name: "photo.png",
            bytes: &image,
        }],
        &[("x-owner-id", "not-a-uuid")],
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
