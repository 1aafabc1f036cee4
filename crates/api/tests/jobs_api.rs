//! Integration tests for job status and result endpoints.

mod common;

use axum::http::StatusCode;
use uuid::Uuid;

use common::{body_json, build_test_app, get, get_with_headers, png_bytes, post_multipart, Part, TestApp};
use shield_core::job::JobStatus;
use shield_core::store::JobStore;
use shield_core::types::JobId;

/// Submit an encrypt job through the API and return its id.
async fn submit_encrypt(app: &TestApp, headers: &[(&str, &str)]) -> JobId {
    let image = png_bytes(64);
    let response = post_multipart(
        &app.router,
        "/api/v1/encrypt",
        &[Part::File {
            name: "image",
            file_name: "photo.png",
            bytes: &image,
        }],
        headers,
    )
    .await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    body_json(response).await["data"]["job_id"]
        .as_str()
        .unwrap()
        .parse()
        .unwrap()
}

/// Drive a queued job to Completed directly through the store.
async fn complete_job(app: &TestApp, job_id: JobId, key_id: Option<Uuid>) {
    app.store
        .update_status(job_id, JobStatus::Processing, 0, None)
        .await
        .unwrap();
    app.store
        .set_outputs(job_id, "/data/out/encrypted.png".into(), key_id)
        .await
        .unwrap();
    app.store
        .update_status(job_id, JobStatus::Completed, 100, None)
        .await
        .unwrap();
}

#[tokio::test]
async fn get_status_of_queued_job() {
    let app = build_test_app();
    let job_id = submit_encrypt(&app, &[]).await;

    let response = get(&app.router, &format!("/api/v1/jobs/{job_id}")).await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["data"]["id"], job_id.to_string());
    assert_eq!(json["data"]["kind"], "encrypt");
    assert_eq!(json["data"]["status"], "queued");
    assert_eq!(json["data"]["progress"], 0);
}

#[tokio::test]
async fn get_status_of_unknown_job_is_404() {
    let app = build_test_app();
    let response = get(&app.router, &format!("/api/v1/jobs/{}", Uuid::new_v4())).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn result_before_completion_is_409() {
    let app = build_test_app();
    let job_id = submit_encrypt(&app, &[]).await;

    let response = get(&app.router, &format!("/api/v1/jobs/{job_id}/result")).await;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let json = body_json(response).await;
    assert_eq!(json["code"], "NOT_READY");
}

#[tokio::test]
async fn result_of_completed_job_carries_locators() {
    let app = build_test_app();
    let job_id = submit_encrypt(&app, &[]).await;
    let key_id = Uuid::new_v4();
    complete_job(&app, job_id, Some(key_id)).await;

    let response = get(&app.router, &format!("/api/v1/jobs/{job_id}/result")).await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["data"]["output_ref"], "/data/out/encrypted.png");
    assert_eq!(json["data"]["key_ref"], key_id.to_string());
}

#[tokio::test]
async fn result_of_foreign_job_is_403() {
    let app = build_test_app();
    let owner = Uuid::new_v4();
    let job_id = submit_encrypt(&app, &[("x-owner-id", &owner.to_string())]).await;
    complete_job(&app, job_id, Some(Uuid::new_v4())).await;

    // No owner header at all.
    let response = get(&app.router, &format!("/api/v1/jobs/{job_id}/result")).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // A different owner.
    let response = get_with_headers(
        &app.router,
        &format!("/api/v1/jobs/{job_id}/result"),
        &[("x-owner-id", &Uuid::new_v4().to_string())],
    )
    .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // The actual owner succeeds.
    let response = get_with_headers(
        &app.router,
        &format!("/api/v1/jobs/{job_id}/result"),
        &[("x-owner-id", &owner.to_string())],
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn status_reflects_failure_message() {
    let app = build_test_app();
    let job_id = submit_encrypt(&app, &[]).await;
    app.store
        .update_status(job_id, JobStatus::Processing, 40, None)
        .await
        .unwrap();
    app.store
        .update_status(
            job_id,
            JobStatus::Failed,
            40,
            Some("engine crashed: corrupt image".into()),
        )
        .await
        .unwrap();

    let response = get(&app.router, &format!("/api/v1/jobs/{job_id}")).await;
    let json = body_json(response).await;
    assert_eq!(json["data"]["status"], "failed");
    assert_eq!(json["data"]["progress"], 40);
    assert_eq!(json["data"]["error_message"], "engine crashed: corrupt image");
}
