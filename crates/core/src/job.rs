//! Job records, kind-specific parameters, and the status state machine.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::CoreError;
use crate::types::{JobId, KeyId, OwnerId, Timestamp};

// ---------------------------------------------------------------------------
// Purity level
// ---------------------------------------------------------------------------

/// Quality/speed tradeoff for the encryption transform.
///
/// Only meaningful for encrypt jobs; the engine ignores it on decrypt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PurityLevel {
    Fast,
    #[default]
    Balanced,
    Maximum,
}

impl PurityLevel {
    /// Parse a client-supplied purity value.
    pub fn parse(value: &str) -> Result<Self, CoreError> {
        match value {
            "fast" => Ok(Self::Fast),
            "balanced" => Ok(Self::Balanced),
            "maximum" => Ok(Self::Maximum),
            _ => Err(CoreError::Validation(format!(
                "Invalid purity level '{value}'. Must be: fast, balanced, or maximum"
            ))),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Fast => "fast",
            Self::Balanced => "balanced",
            Self::Maximum => "maximum",
        }
    }

    /// Expected wall-clock duration of the transform at this level.
    ///
    /// Drives the worker's coarse progress estimation while the engine
    /// runs; higher purity means more rounds of key generation.
    pub fn estimated_duration_secs(self) -> u64 {
        match self {
            Self::Fast => 5,
            Self::Balanced => 15,
            Self::Maximum => 40,
        }
    }
}

// ---------------------------------------------------------------------------
// Job kind and parameters
// ---------------------------------------------------------------------------

/// What a job does: seal an image or open one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
    Encrypt,
    Decrypt,
}

impl JobKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Encrypt => "encrypt",
            Self::Decrypt => "decrypt",
        }
    }
}

/// Kind-specific submission parameters, fixed at creation.
///
/// A tagged variant rather than an open map so each kind's required
/// fields are enforced at the type level: encrypt carries a purity
/// level, decrypt carries the id of the vault key to open the image with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum JobParams {
    Encrypt { purity: PurityLevel },
    Decrypt { key_id: KeyId },
}

impl JobParams {
    pub fn kind(&self) -> JobKind {
        match self {
            Self::Encrypt { .. } => JobKind::Encrypt,
            Self::Decrypt { .. } => JobKind::Decrypt,
        }
    }

    /// Purity level for encrypt jobs; `None` for decrypt.
    pub fn purity(&self) -> Option<PurityLevel> {
        match self {
            Self::Encrypt { purity } => Some(*purity),
            Self::Decrypt { .. } => None,
        }
    }

    /// Expected transform duration, used for progress estimation.
    pub fn estimated_duration_secs(&self) -> u64 {
        match self {
            Self::Encrypt { purity } => purity.estimated_duration_secs(),
            // Decryption skips key generation entirely.
            Self::Decrypt { .. } => 10,
        }
    }
}

// ---------------------------------------------------------------------------
// Status state machine
// ---------------------------------------------------------------------------

/// Job lifecycle status.
///
/// `Queued` is initial; `Completed` and `Failed` are terminal. The only
/// legal edges are `Queued -> Processing`, `Processing -> Processing`
/// (progress update), `Processing -> Completed`, and
/// `Processing -> Failed`. Everything else is rejected by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    /// No transitions leave a terminal state.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Whether the edge `self -> to` is in the transition table.
    pub fn can_transition(self, to: JobStatus) -> bool {
        matches!(
            (self, to),
            (Self::Queued, Self::Processing)
                | (Self::Processing, Self::Processing)
                | (Self::Processing, Self::Completed)
                | (Self::Processing, Self::Failed)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Parse from the persisted text representation.
    pub fn parse(value: &str) -> Result<Self, CoreError> {
        match value {
            "queued" => Ok(Self::Queued),
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(CoreError::Internal(format!("Unknown job status '{other}'"))),
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Job
// ---------------------------------------------------------------------------

/// A single submitted encrypt/decrypt request and its tracked lifecycle.
///
/// `params` and `input_ref` never change after creation. `output_ref`
/// and `key_ref` are write-once, set only on success; `key_ref` points
/// at the vault record an encrypt job produced. `error_message` is set
/// only on `Failed`.
#[derive(Debug, Clone, Serialize)]
pub struct Job {
    pub id: JobId,
    pub params: JobParams,
    pub status: JobStatus,
    /// Percentage in `0..=100`, non-decreasing until terminal.
    pub progress: u8,
    pub input_ref: String,
    pub output_ref: Option<String>,
    pub key_ref: Option<KeyId>,
    pub error_message: Option<String>,
    pub owner_id: Option<OwnerId>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Job {
    /// Create a fresh `Queued` job with a generated id.
    pub fn new(params: JobParams, input_ref: String, owner_id: Option<OwnerId>) -> Self {
        Self::with_id(Uuid::new_v4(), params, input_ref, owner_id)
    }

    /// Create a fresh `Queued` job under a caller-chosen id. The service
    /// generates the id before persisting the input artifact so the
    /// artifact directory and the job record share one identifier.
    pub fn with_id(
        id: JobId,
        params: JobParams,
        input_ref: String,
        owner_id: Option<OwnerId>,
    ) -> Self {
        let now = chrono::Utc::now();
        Self {
            id,
            params,
            status: JobStatus::Queued,
            progress: 0,
            input_ref,
            output_ref: None,
            key_ref: None,
            error_message: None,
            owner_id,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn kind(&self) -> JobKind {
        self.params.kind()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
