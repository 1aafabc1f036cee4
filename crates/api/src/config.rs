/// Server configuration loaded from environment variables.
///
/// All fields except the key-wrapping secret have defaults suitable for
/// local development. In production, override via environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `8080`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS`.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// Upload size ceiling in bytes (default: 50 MiB).
    pub max_upload_bytes: u64,
    /// Wall-clock bound on one engine invocation (default: `45`).
    pub transform_timeout_secs: u64,
    /// Number of worker tasks (default: `2`).
    pub worker_count: usize,
    /// Optional TTL applied to vaulted key material, in seconds.
    pub key_ttl_secs: Option<u64>,
    /// Directory holding per-job artifact directories.
    pub artifact_root: String,
    /// Transform engine executable.
    pub engine_program: String,
    /// Arguments always passed before the engine subcommand.
    pub engine_args: Vec<String>,
    /// Secret the key vault wraps material with. Required; never defaulted.
    pub wrap_secret: String,
    /// When set, jobs and keys persist in PostgreSQL; otherwise the
    /// in-memory store backs a single-process dev deployment.
    pub database_url: Option<String>,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                   | Default                        |
    /// |---------------------------|--------------------------------|
    /// | `HOST`                    | `0.0.0.0`                      |
    /// | `PORT`                    | `8080`                         |
    /// | `CORS_ORIGINS`            | `http://localhost:5173`        |
    /// | `REQUEST_TIMEOUT_SECS`    | `30`                           |
    /// | `MAX_UPLOAD_BYTES`        | `52428800` (50 MiB)            |
    /// | `TRANSFORM_TIMEOUT_SECONDS` | `45`                         |
    /// | `WORKER_COUNT`            | `2`                            |
    /// | `KEY_TTL_SECS`            | unset (keys never expire)      |
    /// | `ARTIFACT_ROOT`           | `data/jobs`                    |
    /// | `ENGINE_PROGRAM`          | `python`                       |
    /// | `ENGINE_ARGS`             | `-m quantum_image_shield.cli`  |
    /// | `KEY_VAULT_WRAP_SECRET`   | required                       |
    /// | `DATABASE_URL`            | unset (in-memory store)        |
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());

        let port: u16 = std::env::var("PORT")
            .unwrap_or_else(|_| "8080".into())
            .parse()
            .expect("PORT must be a valid u16");

        let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:5173".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let request_timeout_secs: u64 = std::env::var("REQUEST_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("REQUEST_TIMEOUT_SECS must be a valid u64");

        let max_upload_bytes: u64 = std::env::var("MAX_UPLOAD_BYTES")
            .unwrap_or_else(|_| (50 * 1024 * 1024).to_string())
            .parse()
            .expect("MAX_UPLOAD_BYTES must be a valid u64");

        let transform_timeout_secs: u64 = std::env::var("TRANSFORM_TIMEOUT_SECONDS")
            .unwrap_or_else(|_| "45".into())
            .parse()
            .expect("TRANSFORM_TIMEOUT_SECONDS must be a valid u64");

        let worker_count: usize = std::env::var("WORKER_COUNT")
            .unwrap_or_else(|_| "2".into())
            .parse()
            .expect("WORKER_COUNT must be a valid usize");

        let key_ttl_secs: Option<u64> = std::env::var("KEY_TTL_SECS")
            .ok()
            .map(|v| v.parse().expect("KEY_TTL_SECS must be a valid u64"));

        let artifact_root =
            std::env::var("ARTIFACT_ROOT").unwrap_or_else(|_| "data/jobs".into());

        let engine_program =
            std::env::var("ENGINE_PROGRAM").unwrap_or_else(|_| "python".into());

        let engine_args: Vec<String> = std::env::var("ENGINE_ARGS")
            .unwrap_or_else(|_| "-m quantum_image_shield.cli".into())
            .split_whitespace()
            .map(String::from)
            .collect();

        let wrap_secret = std::env::var("KEY_VAULT_WRAP_SECRET")
            .expect("KEY_VAULT_WRAP_SECRET must be set");

        let database_url = std::env::var("DATABASE_URL").ok();

        Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            max_upload_bytes,
            transform_timeout_secs,
            worker_count,
            key_ttl_secs,
            artifact_root,
            engine_program,
            engine_args,
            wrap_secret,
            database_url,
        }
    }
}
