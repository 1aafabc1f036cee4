//! Transform engine interface and shared types.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;

use shield_core::job::{JobKind, PurityLevel};

/// One transform invocation.
#[derive(Debug, Clone)]
pub struct TransformRequest {
    pub kind: JobKind,
    /// Source artifact on local disk.
    pub input_path: PathBuf,
    /// Where the engine must write the produced artifact.
    pub output_path: PathBuf,
    /// Quality/speed tradeoff; encrypt only.
    pub purity: Option<PurityLevel>,
    /// Key artifact location: written by the engine on encrypt, read by
    /// it on decrypt.
    pub key_path: Option<PathBuf>,
    /// Maximum wall-clock time before the engine process is killed.
    pub timeout: Duration,
}

/// A successful transform.
#[derive(Debug, Clone)]
pub struct TransformOutcome {
    pub output_path: PathBuf,
    /// Present for encrypt runs: the companion key artifact the engine wrote.
    pub key_path: Option<PathBuf>,
    pub duration_ms: u64,
    /// Raw engine stdout, kept for job debugging.
    pub diagnostics: String,
}

/// Classified transform failures. The adapter never retries -- retry
/// policy, if any, belongs to the caller.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The engine rejected its arguments or the input artifact is unusable.
    #[error("invalid input: {diagnostics}")]
    InvalidInput { diagnostics: String },

    /// The engine exited non-zero or was killed by a signal.
    #[error("engine crashed with exit code {exit_code}: {diagnostics}")]
    Crashed { exit_code: i32, diagnostics: String },

    /// The configured timeout elapsed and the engine process was killed.
    #[error("transform timed out after {elapsed_ms}ms")]
    Timeout { elapsed_ms: u64 },

    /// Spawn/IO failures and success-shaped runs that produced no artifact.
    #[error("engine failure: {diagnostics}")]
    Unknown { diagnostics: String },
}

/// Capability interface over the out-of-process transform engine.
///
/// `run` blocks the calling worker for the duration of the transform,
/// bounded by `request.timeout`.
#[async_trait]
pub trait TransformEngine: Send + Sync {
    async fn run(&self, request: TransformRequest) -> Result<TransformOutcome, EngineError>;
}
