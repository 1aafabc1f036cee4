#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderName, Method, Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use tower::ServiceExt;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

use shield_api::config::ServerConfig;
use shield_api::routes;
use shield_api::state::AppState;
use shield_core::keywrap::KeyWrapper;
use shield_core::queue::JobQueue;
use shield_core::store::JobStore;
use shield_core::vault::KeyVault;
use shield_events::ProgressBus;
use shield_service::{JobService, LocalArtifactStore};
use shield_store::{MemoryJobStore, MemoryKeyVault};

/// Small ceiling so oversize tests stay cheap.
pub const TEST_UPLOAD_LIMIT: u64 = 64 * 1024;

/// A fully wired application over in-memory stores, with handles into
/// the backing state so tests can drive jobs by hand. No worker pool is
/// spawned: submitted jobs stay `Queued` unless a test moves them.
pub struct TestApp {
    pub router: Router,
    pub store: Arc<MemoryJobStore>,
    pub vault: Arc<MemoryKeyVault>,
    _artifact_dir: tempfile::TempDir,
}

/// Build a test `ServerConfig` with safe defaults.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        max_upload_bytes: TEST_UPLOAD_LIMIT,
        transform_timeout_secs: 5,
        worker_count: 0,
        key_ttl_secs: None,
        artifact_root: String::new(),
        engine_program: "true".to_string(),
        engine_args: Vec::new(),
        wrap_secret: "test-wrap-secret".to_string(),
        database_url: None,
    }
}

/// Build the full application router with all middleware layers.
///
/// This mirrors the router construction in `main.rs` so integration
/// tests exercise the same middleware stack (CORS, request ID, timeout,
/// tracing, panic recovery) that production uses.
pub fn build_test_app() -> TestApp {
    let artifact_dir = tempfile::tempdir().unwrap();
    let config = test_config();

    let store = Arc::new(MemoryJobStore::new());
    let vault = Arc::new(MemoryKeyVault::new(KeyWrapper::new(&config.wrap_secret)));
    let service = Arc::new(JobService::new(
        Arc::clone(&store) as Arc<dyn JobStore>,
        Arc::clone(&vault) as Arc<dyn KeyVault>,
        Arc::new(JobQueue::new()),
        Arc::new(LocalArtifactStore::new(artifact_dir.path())),
        Arc::new(ProgressBus::default()),
        config.max_upload_bytes,
    ));

    let state = AppState {
        service,
        config: Arc::new(config),
    };

    let cors = CorsLayer::new()
        .allow_origin(["http://localhost:5173".parse().unwrap()])
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .allow_credentials(true)
        .max_age(Duration::from_secs(3600));

    let request_id_header = HeaderName::from_static("x-request-id");

    let router = Router::new()
        .merge(routes::health::router())
        .nest("/api/v1", routes::api_routes())
        .layer(CatchPanicLayer::new())
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
        .layer(PropagateRequestIdLayer::new(request_id_header.clone()))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(SetRequestIdLayer::new(request_id_header, MakeRequestUuid))
        .layer(cors)
        .with_state(state);

    TestApp {
        router,
        store,
        vault,
        _artifact_dir: artifact_dir,
    }
}

// ---------------------------------------------------------------------------
// Request helpers
// ---------------------------------------------------------------------------

pub async fn get(router: &Router, uri: &str) -> Response<Body> {
    get_with_headers(router, uri, &[]).await
}

pub async fn get_with_headers(
    router: &Router,
    uri: &str,
    headers: &[(&str, &str)],
) -> Response<Body> {
    let mut builder = Request::builder().method(Method::GET).uri(uri);
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    router
        .clone()
        .oneshot(builder.body(Body::empty()).unwrap())
        .await
        .unwrap()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap_or_else(|e| panic!("response body is not JSON: {e}"))
}

// ---------------------------------------------------------------------------
// Multipart helpers
// ---------------------------------------------------------------------------

pub const BOUNDARY: &str = "shield-test-boundary";

pub enum Part<'a> {
    File {
        name: &'a str,
        file_name: &'a str,
        bytes: &'a [u8],
    },
    Text {
        name: &'a str,
        value: &'a str,
    },
}

fn multipart_body(parts: &[Part<'_>]) -> Vec<u8> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        match part {
            Part::File {
                name,
                file_name,
                bytes,
            } => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{name}\"; filename=\"{file_name}\"\r\n\
                         Content-Type: application/octet-stream\r\n\r\n"
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(bytes);
                body.extend_from_slice(b"\r\n");
            }
            Part::Text { name, value } => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n")
                        .as_bytes(),
                );
            }
        }
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

/// POST a multipart form to `uri`.
pub async fn post_multipart(
    router: &Router,
    uri: &str,
    parts: &[Part<'_>],
    headers: &[(&str, &str)],
) -> Response<Body> {
    let mut builder = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(
            CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        );
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    router
        .clone()
        .oneshot(builder.body(Body::from(multipart_body(parts))).unwrap())
        .await
        .unwrap()
}

/// 8-byte PNG signature plus filler; passes the submit-time format sniff.
pub fn png_bytes(len: usize) -> Vec<u8> {
    let mut bytes = b"\x89PNG\r\n\x1a\n".to_vec();
    bytes.resize(len.max(8), 0);
    bytes
}
