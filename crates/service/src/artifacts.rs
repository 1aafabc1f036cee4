//! Artifact storage collaborator and per-job directory layout.
//!
//! Every job gets its own directory under the artifact root:
//!
//! ```text
//! <root>/<job_id>/input.<ext>      uploaded source artifact
//! <root>/<job_id>/encrypted.png    encrypt output
//! <root>/<job_id>/decrypted.png    decrypt output
//! <root>/<job_id>/keys.npz         key artifact (engine-written, vaulted
//!                                  and removed by the worker)
//! ```

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use shield_core::job::JobKind;
use shield_core::types::JobId;

/// File name of an encrypt job's produced artifact.
pub const ENCRYPTED_FILE: &str = "encrypted.png";

/// File name of a decrypt job's produced artifact.
pub const DECRYPTED_FILE: &str = "decrypted.png";

/// File name of the key artifact the engine writes or reads.
pub const KEY_FILE: &str = "keys.npz";

/// Fallback extension when an upload carries none.
const DEFAULT_EXT: &str = "png";

#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    #[error("artifact storage failure: {0}")]
    Io(#[from] std::io::Error),
}

/// Persists uploaded inputs. The rest of the per-job layout is derived
/// from the returned input locator with [`output_path_for`] and
/// [`key_path_for`].
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Write the uploaded bytes under the job's directory and return the
    /// stored artifact's locator.
    async fn persist_input(
        &self,
        job_id: JobId,
        file_name: &str,
        bytes: &[u8],
    ) -> Result<String, ArtifactError>;
}

/// Where a job's produced artifact lives, next to its input.
pub fn output_path_for(input_ref: &str, kind: JobKind) -> PathBuf {
    sibling(
        input_ref,
        match kind {
            JobKind::Encrypt => ENCRYPTED_FILE,
            JobKind::Decrypt => DECRYPTED_FILE,
        },
    )
}

/// Where a job's key artifact lives, next to its input.
pub fn key_path_for(input_ref: &str) -> PathBuf {
    sibling(input_ref, KEY_FILE)
}

fn sibling(input_ref: &str, file_name: &str) -> PathBuf {
    Path::new(input_ref)
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join(file_name)
}

// ---------------------------------------------------------------------------
// Local filesystem implementation
// ---------------------------------------------------------------------------

/// Stores artifacts on the local filesystem under a configured root.
pub struct LocalArtifactStore {
    root: PathBuf,
}

impl LocalArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl ArtifactStore for LocalArtifactStore {
    async fn persist_input(
        &self,
        job_id: JobId,
        file_name: &str,
        bytes: &[u8],
    ) -> Result<String, ArtifactError> {
        let dir = self.root.join(job_id.to_string());
        tokio::fs::create_dir_all(&dir).await?;

        let ext = Path::new(file_name)
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or(DEFAULT_EXT);
        let path = dir.join(format!("input.{ext}"));
        tokio::fs::write(&path, bytes).await?;

        Ok(path.to_string_lossy().into_owned())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
