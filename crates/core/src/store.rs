//! Job store contract and the shared transition-application logic.
//!
//! The state machine is enforced here, in pure functions, so every store
//! implementation (in-memory, PostgreSQL) applies exactly the same rules:
//! an illegal edge is rejected with [`StoreError::InvalidTransition`] and
//! leaves the record untouched.

use async_trait::async_trait;

use crate::job::{Job, JobKind, JobStatus};
use crate::types::{JobId, KeyId, Timestamp};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("job not found")]
    NotFound,

    /// The requested edge is not in the state machine. Always a
    /// programming or race defect in the caller; never applied silently.
    #[error("illegal status transition: {from} -> {to}")]
    InvalidTransition { from: JobStatus, to: JobStatus },

    /// A write-once or precondition rule was violated.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The backing storage could not be reached or failed mid-operation.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

// ---------------------------------------------------------------------------
// Contract
// ---------------------------------------------------------------------------

/// Durable record of jobs and their state transitions.
///
/// Implementations must apply each update atomically per job: no reader
/// observes a half-applied status/progress/timestamp write, and `get`
/// reflects the most recent committed update. Concurrent updates to one
/// job are serialized.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a freshly created job. Rejects a duplicate id with `Conflict`.
    async fn create(&self, job: Job) -> Result<JobId, StoreError>;

    async fn get(&self, id: JobId) -> Result<Job, StoreError>;

    /// Apply a status transition per the rules of [`apply_status_update`].
    async fn update_status(
        &self,
        id: JobId,
        status: JobStatus,
        progress: u8,
        error_message: Option<String>,
    ) -> Result<Job, StoreError>;

    /// Record the produced output (and, for encrypt, key) locators.
    /// Write-once, and only while the job is `Processing`.
    async fn set_outputs(
        &self,
        id: JobId,
        output_ref: String,
        key_ref: Option<KeyId>,
    ) -> Result<Job, StoreError>;

    /// All jobs currently in `status`, oldest first. Powers the startup
    /// recovery scan that re-enqueues `Queued` jobs and fails orphaned
    /// `Processing` ones.
    async fn list_by_status(&self, status: JobStatus) -> Result<Vec<Job>, StoreError>;
}

// ---------------------------------------------------------------------------
// Pure transition application
// ---------------------------------------------------------------------------

/// Validate a status update against `job` and return the updated copy.
///
/// Rules, in order:
/// - the edge `job.status -> status` must be legal;
/// - `Completed` requires `output_ref` already recorded (and `key_ref`
///   for encrypt jobs), fixes progress at 100, and carries no error;
/// - `Failed` requires an error message and freezes progress at its last
///   stored value;
/// - `Processing` carries no error and progress is clamped non-decreasing.
pub fn apply_status_update(
    job: &Job,
    status: JobStatus,
    progress: u8,
    error_message: Option<String>,
    now: Timestamp,
) -> Result<Job, StoreError> {
    if !job.status.can_transition(status) {
        return Err(StoreError::InvalidTransition {
            from: job.status,
            to: status,
        });
    }

    let mut updated = job.clone();
    match status {
        JobStatus::Completed => {
            if updated.output_ref.is_none() {
                return Err(StoreError::Conflict(
                    "cannot complete a job without an output reference".into(),
                ));
            }
            if updated.kind() == JobKind::Encrypt && updated.key_ref.is_none() {
                return Err(StoreError::Conflict(
                    "cannot complete an encrypt job without a key reference".into(),
                ));
            }
            if error_message.is_some() {
                return Err(StoreError::Conflict(
                    "a completed job carries no error message".into(),
                ));
            }
            updated.progress = 100;
        }
        JobStatus::Failed => {
            let message = error_message.ok_or_else(|| {
                StoreError::Conflict("transition to Failed requires an error message".into())
            })?;
            updated.error_message = Some(message);
            // Progress stays frozen at the last value before the failure.
        }
        JobStatus::Processing => {
            if error_message.is_some() {
                return Err(StoreError::Conflict(
                    "only a failed job carries an error message".into(),
                ));
            }
            updated.progress = updated.progress.max(progress.min(100));
        }
        // Queued is the initial state; can_transition already rejected it.
        JobStatus::Queued => unreachable!("no edge leads back to Queued"),
    }

    updated.status = status;
    updated.updated_at = now;
    Ok(updated)
}

/// Validate an output-locator write against `job` and return the updated
/// copy. Locators are write-once and may only be recorded while the
/// owning worker holds the job in `Processing`.
pub fn apply_set_outputs(
    job: &Job,
    output_ref: String,
    key_ref: Option<KeyId>,
    now: Timestamp,
) -> Result<Job, StoreError> {
    if job.status != JobStatus::Processing {
        return Err(StoreError::Conflict(format!(
            "outputs may only be recorded while Processing (status is {})",
            job.status
        )));
    }
    if job.output_ref.is_some() || job.key_ref.is_some() {
        return Err(StoreError::Conflict("output references are write-once".into()));
    }

    let mut updated = job.clone();
    updated.output_ref = Some(output_ref);
    updated.key_ref = key_ref;
    updated.updated_at = now;
    Ok(updated)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
