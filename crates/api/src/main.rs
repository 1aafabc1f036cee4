use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::extract::DefaultBodyLimit;
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderName, Method};
use axum::Router;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use shield_api::config::ServerConfig;
use shield_api::routes;
use shield_api::state::AppState;
use shield_core::keywrap::KeyWrapper;
use shield_core::queue::JobQueue;
use shield_core::store::JobStore;
use shield_core::vault::KeyVault;
use shield_engine::CliEngine;
use shield_events::ProgressBus;
use shield_service::{JobService, LocalArtifactStore};
use shield_store::{MemoryJobStore, MemoryKeyVault, PgJobStore, PgKeyVault};
use shield_worker::{WorkerConfig, WorkerContext, WorkerPool};

/// Multipart framing overhead allowed on top of the artifact ceiling.
/// The exact upload limit is enforced by the job service.
const UPLOAD_OVERHEAD_BYTES: u64 = 1024 * 1024;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "shield_api=debug,shield_worker=debug,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");

    let wrapper = KeyWrapper::new(&config.wrap_secret);

    // --- Stores ---
    let (store, vault): (Arc<dyn JobStore>, Arc<dyn KeyVault>) = match &config.database_url {
        Some(url) => {
            let pool = shield_store::create_pool(url)
                .await
                .context("Failed to connect to database")?;
            shield_store::run_migrations(&pool)
                .await
                .context("Failed to run database migrations")?;
            tracing::info!("Database connected, migrations applied");
            (
                Arc::new(PgJobStore::new(pool.clone())),
                Arc::new(PgKeyVault::new(pool, wrapper)),
            )
        }
        None => {
            tracing::warn!("DATABASE_URL not set; jobs and keys are held in memory only");
            (
                Arc::new(MemoryJobStore::new()),
                Arc::new(MemoryKeyVault::new(wrapper)),
            )
        }
    };

    // --- Artifact storage ---
    tokio::fs::create_dir_all(&config.artifact_root)
        .await
        .context("Failed to create artifact root")?;
    let artifacts = Arc::new(LocalArtifactStore::new(config.artifact_root.clone()));

    // --- Queue / progress bus / engine ---
    let queue = Arc::new(JobQueue::new());
    let progress = Arc::new(ProgressBus::default());
    let engine = Arc::new(CliEngine::new(
        config.engine_program.clone(),
        config.engine_args.clone(),
    ));

    // --- Job service ---
    let service = Arc::new(JobService::new(
        Arc::clone(&store),
        Arc::clone(&vault),
        Arc::clone(&queue),
        artifacts,
        Arc::clone(&progress),
        config.max_upload_bytes,
    ));

    // Recovery scan before the workers start: re-enqueue Queued jobs and
    // fail the Processing jobs a previous run left behind.
    let report = service.recover().await?;
    tracing::info!(
        requeued = report.requeued,
        failed = report.failed,
        "Startup recovery finished",
    );

    // --- Worker pool ---
    let pool = WorkerPool::spawn(WorkerContext {
        store,
        vault,
        queue: Arc::clone(&queue),
        engine,
        progress,
        config: WorkerConfig {
            workers: config.worker_count,
            transform_timeout: Duration::from_secs(config.transform_timeout_secs),
            key_ttl: config.key_ttl_secs.map(Duration::from_secs),
            ..WorkerConfig::default()
        },
    });

    // --- App state ---
    let state = AppState {
        service,
        config: Arc::new(config.clone()),
    };

    // --- CORS ---
    let cors = build_cors_layer(&config);

    // --- Request ID header name ---
    let request_id_header = HeaderName::from_static("x-request-id");

    // --- Router ---
    let app = Router::new()
        // Health check at root level (not under /api/v1).
        .merge(routes::health::router())
        // API v1 routes.
        .nest("/api/v1", routes::api_routes())
        // -- Middleware stack (applied bottom-up) --
        // Uploads up to the ceiling plus multipart framing.
        .layer(DefaultBodyLimit::max(
            (config.max_upload_bytes + UPLOAD_OVERHEAD_BYTES) as usize,
        ))
        // Panic recovery: catch panics and return 500.
        .layer(CatchPanicLayer::new())
        // Request timeout.
        .layer(TimeoutLayer::new(Duration::from_secs(
            config.request_timeout_secs,
        )))
        // Propagate request ID to response.
        .layer(PropagateRequestIdLayer::new(request_id_header.clone()))
        // Structured request/response tracing.
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        // Set request ID on incoming requests.
        .layer(SetRequestIdLayer::new(request_id_header, MakeRequestUuid))
        // CORS.
        .layer(cors)
        // Shared state.
        .with_state(state);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().context("Invalid HOST address")?,
        config.port,
    );
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;
    tracing::info!(%addr, "Starting server");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");

    // Stop handing out work and wait for in-flight transforms to finish;
    // undequeued jobs stay Queued in the store for the next start.
    pool.shutdown().await;

    tracing::info!("Graceful shutdown complete");
    Ok(())
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix) so the server
/// shuts down cleanly whether stopped interactively or by a process
/// manager (e.g. systemd, Docker, Kubernetes).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}

/// Build the CORS middleware layer from server configuration.
///
/// Panics at startup if any configured origin is invalid, which is the
/// desired behaviour -- we want misconfiguration to fail fast.
fn build_cors_layer(config: &ServerConfig) -> CorsLayer {
    let origins: Vec<_> = config
        .cors_origins
        .iter()
        .map(|o| {
            o.parse()
                .unwrap_or_else(|e| panic!("Invalid CORS origin '{o}': {e}"))
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .allow_credentials(true)
        .max_age(Duration::from_secs(3600))
}
