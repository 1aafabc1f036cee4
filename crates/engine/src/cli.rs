//! CLI implementation of the transform engine.
//!
//! Invokes the engine executable as
//! `{encrypt|decrypt} <input> <output> [--purity <level>] [--key <path>]`,
//! pipes and caps its output streams, and enforces the request timeout by
//! killing the child process.

use std::process::Stdio;
use std::time::Instant;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;

use shield_core::job::JobKind;

use crate::engine::{EngineError, TransformEngine, TransformOutcome, TransformRequest};

/// Maximum stdout or stderr size captured per stream (1 MiB).
///
/// Diagnostics beyond this are truncated to prevent memory exhaustion
/// from a pathologically verbose engine.
const MAX_OUTPUT_BYTES: usize = 1024 * 1024;

/// Exit code argparse-style CLIs use for usage errors.
const EXIT_USAGE: i32 = 2;

/// Shells out to the transform engine CLI.
///
/// `program` plus `base_args` form the interpreter prefix (the default
/// deployment runs `python -m quantum_image_shield.cli`); the per-request
/// subcommand and paths are appended on each run.
pub struct CliEngine {
    program: String,
    base_args: Vec<String>,
}

impl CliEngine {
    pub fn new(program: impl Into<String>, base_args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            base_args,
        }
    }
}

#[async_trait]
impl TransformEngine for CliEngine {
    async fn run(&self, request: TransformRequest) -> Result<TransformOutcome, EngineError> {
        // Reject an unreadable input before paying for a process spawn.
        if tokio::fs::metadata(&request.input_path).await.is_err() {
            return Err(EngineError::InvalidInput {
                diagnostics: format!(
                    "input artifact does not exist: {}",
                    request.input_path.display()
                ),
            });
        }
        if request.kind == JobKind::Decrypt && request.key_path.is_none() {
            return Err(EngineError::InvalidInput {
                diagnostics: "decrypt requires a key artifact path".into(),
            });
        }

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.base_args)
            .arg(request.kind.as_str())
            .arg(&request.input_path)
            .arg(&request.output_path);
        if let Some(purity) = request.purity {
            cmd.arg("--purity").arg(purity.as_str());
        }
        if let Some(key_path) = &request.key_path {
            cmd.arg("--key").arg(key_path);
        }

        // `kill_on_drop(true)` ensures the child dies when dropped on timeout.
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let start = Instant::now();
        let mut child = cmd.spawn().map_err(|e| EngineError::Unknown {
            diagnostics: format!("failed to spawn engine '{}': {e}", self.program),
        })?;

        // Read the streams in spawned tasks so `child.wait()` stays usable.
        let stdout_handle = child.stdout.take();
        let stderr_handle = child.stderr.take();
        let stdout_task = tokio::spawn(async move { read_stream(stdout_handle).await });
        let stderr_task = tokio::spawn(async move { read_stream(stderr_handle).await });

        let wait_result = tokio::time::timeout(request.timeout, child.wait()).await;

        match wait_result {
            Ok(Ok(status)) => {
                let duration_ms = start.elapsed().as_millis() as u64;
                let stdout =
                    String::from_utf8_lossy(&stdout_task.await.unwrap_or_default()).into_owned();
                let stderr =
                    String::from_utf8_lossy(&stderr_task.await.unwrap_or_default()).into_owned();

                if !status.success() {
                    let exit_code = status.code().unwrap_or(-1);
                    let diagnostics = diagnostics_of(&stdout, &stderr);
                    return Err(if exit_code == EXIT_USAGE {
                        EngineError::InvalidInput { diagnostics }
                    } else {
                        EngineError::Crashed {
                            exit_code,
                            diagnostics,
                        }
                    });
                }

                // Success must leave the promised artifacts behind.
                if tokio::fs::metadata(&request.output_path).await.is_err() {
                    return Err(EngineError::Unknown {
                        diagnostics: format!(
                            "engine exited 0 but wrote no output artifact: {}",
                            diagnostics_of(&stdout, &stderr)
                        ),
                    });
                }
                if request.kind == JobKind::Encrypt {
                    if let Some(key_path) = &request.key_path {
                        if tokio::fs::metadata(key_path).await.is_err() {
                            return Err(EngineError::Unknown {
                                diagnostics: format!(
                                    "engine exited 0 but wrote no key artifact: {}",
                                    diagnostics_of(&stdout, &stderr)
                                ),
                            });
                        }
                    }
                }

                tracing::debug!(
                    kind = request.kind.as_str(),
                    duration_ms,
                    "Transform engine run finished",
                );

                Ok(TransformOutcome {
                    output_path: request.output_path,
                    key_path: match request.kind {
                        JobKind::Encrypt => request.key_path,
                        JobKind::Decrypt => None,
                    },
                    duration_ms,
                    diagnostics: stdout,
                })
            }
            Ok(Err(e)) => Err(EngineError::Unknown {
                diagnostics: format!("failed waiting on engine process: {e}"),
            }),
            Err(_elapsed) => {
                // `child` is dropped here, which kills the process.
                Err(EngineError::Timeout {
                    elapsed_ms: start.elapsed().as_millis() as u64,
                })
            }
        }
    }
}

/// Prefer stderr for diagnostics, falling back to stdout.
fn diagnostics_of(stdout: &str, stderr: &str) -> String {
    let stderr = stderr.trim();
    if stderr.is_empty() {
        stdout.trim().to_string()
    } else {
        stderr.to_string()
    }
}

/// Read an entire output stream into a byte buffer, capped at [`MAX_OUTPUT_BYTES`].
async fn read_stream<R: AsyncRead + Unpin>(handle: Option<R>) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(mut h) = handle {
        let _ = (&mut h)
            .take(MAX_OUTPUT_BYTES as u64)
            .read_to_end(&mut buf)
            .await;
    }
    buf
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
