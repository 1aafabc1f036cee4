//! The job service façade.
//!
//! Orchestrates the job store, queue, key vault, and artifact storage on
//! behalf of the HTTP layer. Validation and size errors reject a
//! submission synchronously and never create a job; failures discovered
//! during processing are recorded on the job by the workers and surfaced
//! here through `get_status` / `get_result`.

use std::sync::Arc;

use serde::Serialize;
use uuid::Uuid;

use shield_core::job::{Job, JobKind, JobParams, JobStatus, PurityLevel};
use shield_core::queue::JobQueue;
use shield_core::store::{JobStore, StoreError};
use shield_core::types::{JobId, KeyId, OwnerId, Timestamp};
use shield_core::vault::KeyVault;
use shield_events::ProgressBus;

use crate::artifacts::ArtifactStore;

/// How many times an artifact write is attempted before the submission
/// fails with `StorageFailure`.
const STORAGE_ATTEMPTS: u32 = 3;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// Client-fixable submission problem, surfaced verbatim.
    #[error("{0}")]
    InvalidParams(String),

    #[error("artifact of {size_bytes} bytes exceeds the {limit_bytes}-byte upload ceiling")]
    ArtifactTooLarge { size_bytes: u64, limit_bytes: u64 },

    #[error("job or key not found")]
    NotFound,

    /// The result was requested before the job completed.
    #[error("job is not completed (status: {status})")]
    NotReady { status: JobStatus },

    #[error("requesting owner does not match the job owner")]
    Forbidden,

    /// The persistence layer is unavailable; already retried where retry
    /// is safe.
    #[error("storage failure: {0}")]
    StorageFailure(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => ServiceError::NotFound,
            StoreError::Unavailable(msg) => ServiceError::StorageFailure(msg),
            other => ServiceError::Internal(other.to_string()),
        }
    }
}

// ---------------------------------------------------------------------------
// Requests and projections
// ---------------------------------------------------------------------------

/// Kind-specific submission input, still in wire form.
#[derive(Debug)]
pub enum SubmitKind {
    Encrypt { purity: Option<String> },
    Decrypt { key_id: String },
}

/// A validated-not-yet submission.
#[derive(Debug)]
pub struct SubmitRequest {
    pub kind: SubmitKind,
    /// Client-supplied file name; only its extension is kept.
    pub file_name: String,
    pub bytes: Vec<u8>,
    pub owner_id: Option<OwnerId>,
}

/// Read-only status projection, safe to poll at any rate.
#[derive(Debug, Clone, Serialize)]
pub struct JobView {
    pub id: JobId,
    pub kind: JobKind,
    pub status: JobStatus,
    pub progress: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub purity: Option<PurityLevel>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl From<Job> for JobView {
    fn from(job: Job) -> Self {
        Self {
            id: job.id,
            kind: job.kind(),
            status: job.status,
            progress: job.progress,
            purity: job.params.purity(),
            error_message: job.error_message,
            created_at: job.created_at,
            updated_at: job.updated_at,
        }
    }
}

/// Locators of a completed job's products.
#[derive(Debug, Clone, Serialize)]
pub struct JobResult {
    pub output_ref: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_ref: Option<KeyId>,
}

/// What the startup recovery scan did.
#[derive(Debug, Clone, Copy, Default)]
pub struct RecoveryReport {
    /// Queued jobs put back on the queue.
    pub requeued: usize,
    /// Orphaned Processing jobs transitioned to Failed.
    pub failed: usize,
}

// ---------------------------------------------------------------------------
// JobService
// ---------------------------------------------------------------------------

pub struct JobService {
    store: Arc<dyn JobStore>,
    vault: Arc<dyn KeyVault>,
    queue: Arc<JobQueue>,
    artifacts: Arc<dyn ArtifactStore>,
    progress: Arc<ProgressBus>,
    max_upload_bytes: u64,
}

impl JobService {
    pub fn new(
        store: Arc<dyn JobStore>,
        vault: Arc<dyn KeyVault>,
        queue: Arc<JobQueue>,
        artifacts: Arc<dyn ArtifactStore>,
        progress: Arc<ProgressBus>,
        max_upload_bytes: u64,
    ) -> Self {
        Self {
            store,
            vault,
            queue,
            artifacts,
            progress,
            max_upload_bytes,
        }
    }

    /// Validate a submission, persist its artifact, create the job
    /// (`Queued`) and enqueue it. Returns the new job id.
    pub async fn submit(&self, request: SubmitRequest) -> Result<JobId, ServiceError> {
        // Size ceiling first: nothing is written for an oversized upload.
        let size_bytes = request.bytes.len() as u64;
        if size_bytes > self.max_upload_bytes {
            return Err(ServiceError::ArtifactTooLarge {
                size_bytes,
                limit_bytes: self.max_upload_bytes,
            });
        }

        let params = self.validate_params(&request).await?;
        let job_id = Uuid::new_v4();
        let input_ref = self
            .persist_with_retry(job_id, &request.file_name, &request.bytes)
            .await?;

        let job = Job::with_id(job_id, params, input_ref, request.owner_id);
        let kind = job.kind();
        self.store.create(job).await?;
        self.queue.enqueue(job_id);

        tracing::info!(
            job_id = %job_id,
            kind = kind.as_str(),
            size_bytes,
            "Job submitted",
        );
        Ok(job_id)
    }

    /// Read-only projection of status/progress/error.
    pub async fn get_status(&self, job_id: JobId) -> Result<JobView, ServiceError> {
        Ok(self.store.get(job_id).await?.into())
    }

    /// Result locators of a completed job.
    ///
    /// Ownership is checked before readiness so a foreign caller learns
    /// nothing about the job's progress.
    pub async fn get_result(
        &self,
        job_id: JobId,
        requesting_owner: Option<OwnerId>,
    ) -> Result<JobResult, ServiceError> {
        let job = self.store.get(job_id).await?;

        if let Some(owner) = job.owner_id {
            if requesting_owner != Some(owner) {
                return Err(ServiceError::Forbidden);
            }
        }
        if job.status != JobStatus::Completed {
            return Err(ServiceError::NotReady { status: job.status });
        }

        let output_ref = job.output_ref.ok_or_else(|| {
            ServiceError::Internal("completed job is missing its output reference".into())
        })?;
        Ok(JobResult {
            output_ref,
            key_ref: job.key_ref,
        })
    }

    /// Startup recovery scan.
    ///
    /// The in-process queue does not survive a restart, so every job still
    /// `Queued` is re-enqueued (workers tolerate duplicate delivery). Jobs
    /// left `Processing` by a crash can never be resumed -- the state
    /// machine has no edge back to `Queued` -- so they are failed with a
    /// descriptive message rather than sitting at `Processing` forever.
    pub async fn recover(&self) -> Result<RecoveryReport, ServiceError> {
        let mut report = RecoveryReport::default();

        for job in self.store.list_by_status(JobStatus::Queued).await? {
            self.queue.enqueue(job.id);
            report.requeued += 1;
        }

        for job in self.store.list_by_status(JobStatus::Processing).await? {
            match self
                .store
                .update_status(
                    job.id,
                    JobStatus::Failed,
                    job.progress,
                    Some("processing interrupted by service restart".into()),
                )
                .await
            {
                Ok(updated) => {
                    self.progress
                        .publish(updated.id, updated.status, updated.progress);
                    report.failed += 1;
                }
                Err(e) => {
                    tracing::error!(job_id = %job.id, error = %e, "Failed to fail orphaned job");
                }
            }
        }

        if report.requeued > 0 || report.failed > 0 {
            tracing::info!(
                requeued = report.requeued,
                failed = report.failed,
                "Recovery scan finished",
            );
        }
        Ok(report)
    }

    /// Kind-specific validation, producing the typed job parameters.
    async fn validate_params(&self, request: &SubmitRequest) -> Result<JobParams, ServiceError> {
        match &request.kind {
            SubmitKind::Encrypt { purity } => {
                let purity = match purity.as_deref() {
                    Some(value) => PurityLevel::parse(value)
                        .map_err(|e| ServiceError::InvalidParams(e.to_string()))?,
                    None => PurityLevel::default(),
                };
                // Header-only sniff; the engine does the real decode.
                image::guess_format(&request.bytes).map_err(|_| {
                    ServiceError::InvalidParams("input is not a recognized image format".into())
                })?;
                Ok(JobParams::Encrypt { purity })
            }
            SubmitKind::Decrypt { key_id } => {
                let key_id = Uuid::parse_str(key_id).map_err(|_| {
                    ServiceError::InvalidParams(format!("invalid key reference '{key_id}'"))
                })?;
                // Resolvable means the record exists; owner and expiry are
                // enforced when the worker retrieves the material.
                match self.vault.exists(key_id).await {
                    Ok(true) => Ok(JobParams::Decrypt { key_id }),
                    Ok(false) => Err(ServiceError::NotFound),
                    Err(e) => Err(ServiceError::StorageFailure(e.to_string())),
                }
            }
        }
    }

    /// Persist the input artifact, retrying a bounded number of times.
    async fn persist_with_retry(
        &self,
        job_id: JobId,
        file_name: &str,
        bytes: &[u8],
    ) -> Result<String, ServiceError> {
        let mut last_error = String::new();
        for attempt in 1..=STORAGE_ATTEMPTS {
            match self.artifacts.persist_input(job_id, file_name, bytes).await {
                Ok(input_ref) => return Ok(input_ref),
                Err(e) => {
                    tracing::warn!(
                        job_id = %job_id,
                        attempt,
                        error = %e,
                        "Artifact write failed",
                    );
                    last_error = e.to_string();
                }
            }
        }
        Err(ServiceError::StorageFailure(last_error))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::LocalArtifactStore;
    use assert_matches::assert_matches;
    use shield_core::keywrap::KeyWrapper;
    use shield_core::queue::Dequeued;
    use shield_store::{MemoryJobStore, MemoryKeyVault};

    /// 8-byte PNG signature plus filler; enough for the header sniff.
    fn png_bytes(len: usize) -> Vec<u8> {
        let mut bytes = b"\x89PNG\r\n\x1a\n".to_vec();
        bytes.resize(len.max(8), 0);
        bytes
    }

    struct Fixture {
        service: JobService,
        store: Arc<MemoryJobStore>,
        vault: Arc<MemoryKeyVault>,
        queue: Arc<JobQueue>,
        _dir: tempfile::TempDir,
    }

    fn fixture() -> Fixture {
        fixture_with_limit(50 * 1024 * 1024)
    }

    fn fixture_with_limit(max_upload_bytes: u64) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryJobStore::new());
        let vault = Arc::new(MemoryKeyVault::new(KeyWrapper::new("test-secret")));
        let queue = Arc::new(JobQueue::new());
        let service = JobService::new(
            Arc::clone(&store) as Arc<dyn JobStore>,
            Arc::clone(&vault) as Arc<dyn KeyVault>,
            Arc::clone(&queue),
            Arc::new(LocalArtifactStore::new(dir.path())),
            Arc::new(ProgressBus::default()),
            max_upload_bytes,
        );
        Fixture {
            service,
            store,
            vault,
            queue,
            _dir: dir,
        }
    }

    fn encrypt_request(bytes: Vec<u8>, purity: Option<&str>) -> SubmitRequest {
        SubmitRequest {
            kind: SubmitKind::Encrypt {
                purity: purity.map(String::from),
            },
            file_name: "photo.png".into(),
            bytes,
            owner_id: None,
        }
    }

    #[tokio::test]
    async fn submit_encrypt_creates_queued_job_and_enqueues_it() {
        let fx = fixture();
        let job_id = fx
            .service
            .submit(encrypt_request(png_bytes(1024), Some("fast")))
            .await
            .unwrap();

        let job = fx.store.get(job_id).await.unwrap();
        assert_eq!(job.status, JobStatus::Queued);
        assert_eq!(job.params.purity(), Some(PurityLevel::Fast));
        assert!(std::fs::read(&job.input_ref).unwrap().starts_with(b"\x89PNG"));

        assert_eq!(fx.queue.dequeue().await, Dequeued::Job(job_id));
    }

    #[tokio::test]
    async fn submit_defaults_purity_to_balanced() {
        let fx = fixture();
        let job_id = fx
            .service
            .submit(encrypt_request(png_bytes(16), None))
            .await
            .unwrap();
        let job = fx.store.get(job_id).await.unwrap();
        assert_eq!(job.params.purity(), Some(PurityLevel::Balanced));
    }

    #[tokio::test]
    async fn oversized_upload_is_rejected_without_creating_a_job() {
        let fx = fixture_with_limit(1024);
        let err = fx
            .service
            .submit(encrypt_request(png_bytes(2048), Some("fast")))
            .await
            .unwrap_err();
        assert_matches!(err, ServiceError::ArtifactTooLarge { size_bytes: 2048, .. });

        assert!(fx
            .store
            .list_by_status(JobStatus::Queued)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn invalid_purity_is_rejected() {
        let fx = fixture();
        let err = fx
            .service
            .submit(encrypt_request(png_bytes(16), Some("ludicrous")))
            .await
            .unwrap_err();
        assert_matches!(err, ServiceError::InvalidParams(_));
    }

    #[tokio::test]
    async fn non_image_upload_is_rejected_for_encrypt() {
        let fx = fixture();
        let err = fx
            .service
            .submit(encrypt_request(b"just text".to_vec(), None))
            .await
            .unwrap_err();
        assert_matches!(err, ServiceError::InvalidParams(_));
    }

    #[tokio::test]
    async fn decrypt_requires_a_resolvable_key_reference() {
        let fx = fixture();

        let err = fx
            .service
            .submit(SubmitRequest {
                kind: SubmitKind::Decrypt {
                    key_id: "not-a-uuid".into(),
                },
                file_name: "sealed.png".into(),
                bytes: png_bytes(16),
                owner_id: None,
            })
            .await
            .unwrap_err();
        assert_matches!(err, ServiceError::InvalidParams(_));

        let err = fx
            .service
            .submit(SubmitRequest {
                kind: SubmitKind::Decrypt {
                    key_id: Uuid::new_v4().to_string(),
                },
                file_name: "sealed.png".into(),
                bytes: png_bytes(16),
                owner_id: None,
            })
            .await
            .unwrap_err();
        assert_matches!(err, ServiceError::NotFound);
    }

    #[tokio::test]
    async fn decrypt_with_existing_key_is_accepted_even_if_expired() {
        let fx = fixture();
        // Expired immediately; submission still accepts it -- the worker
        // discovers the expiry and fails the job asynchronously.
        let key_id = fx
            .vault
            .store(Uuid::new_v4(), None, b"material", Some(std::time::Duration::ZERO))
            .await
            .unwrap();

        let job_id = fx
            .service
            .submit(SubmitRequest {
                kind: SubmitKind::Decrypt {
                    key_id: key_id.to_string(),
                },
                file_name: "sealed.png".into(),
                bytes: png_bytes(16),
                owner_id: None,
            })
            .await
            .unwrap();
        assert_eq!(fx.store.get(job_id).await.unwrap().kind(), JobKind::Decrypt);
    }

    #[tokio::test]
    async fn get_status_projects_the_job() {
        let fx = fixture();
        let job_id = fx
            .service
            .submit(encrypt_request(png_bytes(16), Some("maximum")))
            .await
            .unwrap();

        let view = fx.service.get_status(job_id).await.unwrap();
        assert_eq!(view.id, job_id);
        assert_eq!(view.kind, JobKind::Encrypt);
        assert_eq!(view.status, JobStatus::Queued);
        assert_eq!(view.progress, 0);
        assert_eq!(view.purity, Some(PurityLevel::Maximum));

        assert_matches!(
            fx.service.get_status(Uuid::new_v4()).await,
            Err(ServiceError::NotFound)
        );
    }

    #[tokio::test]
    async fn get_result_is_not_ready_until_completed() {
        let fx = fixture();
        let job_id = fx
            .service
            .submit(encrypt_request(png_bytes(16), None))
            .await
            .unwrap();

        assert_matches!(
            fx.service.get_result(job_id, None).await,
            Err(ServiceError::NotReady {
                status: JobStatus::Queued
            })
        );

        // Drive the job to completion by hand.
        fx.store
            .update_status(job_id, JobStatus::Processing, 0, None)
            .await
            .unwrap();
        let key_id = Uuid::new_v4();
        fx.store
            .set_outputs(job_id, "/out/encrypted.png".into(), Some(key_id))
            .await
            .unwrap();
        fx.store
            .update_status(job_id, JobStatus::Completed, 100, None)
            .await
            .unwrap();

        let result = fx.service.get_result(job_id, None).await.unwrap();
        assert_eq!(result.output_ref, "/out/encrypted.png");
        assert_eq!(result.key_ref, Some(key_id));
    }

    #[tokio::test]
    async fn get_result_enforces_ownership() {
        let fx = fixture();
        let owner = Uuid::new_v4();
        let mut request = encrypt_request(png_bytes(16), None);
        request.owner_id = Some(owner);
        let job_id = fx.service.submit(request).await.unwrap();

        assert_matches!(
            fx.service.get_result(job_id, None).await,
            Err(ServiceError::Forbidden)
        );
        assert_matches!(
            fx.service.get_result(job_id, Some(Uuid::new_v4())).await,
            Err(ServiceError::Forbidden)
        );
        // The owner gets NotReady rather than Forbidden.
        assert_matches!(
            fx.service.get_result(job_id, Some(owner)).await,
            Err(ServiceError::NotReady { .. })
        );
    }

    #[tokio::test]
    async fn recover_requeues_queued_and_fails_orphaned_processing() {
        let fx = fixture();
        let queued_id = fx
            .service
            .submit(encrypt_request(png_bytes(16), None))
            .await
            .unwrap();
        let orphan_id = fx
            .service
            .submit(encrypt_request(png_bytes(16), None))
            .await
            .unwrap();
        fx.store
            .update_status(orphan_id, JobStatus::Processing, 30, None)
            .await
            .unwrap();

        // Drain the queue to simulate a fresh process with empty channels.
        while let Dequeued::Job(_) = tokio::time::timeout(
            std::time::Duration::from_millis(50),
            fx.queue.dequeue(),
        )
        .await
        .unwrap_or(Dequeued::Shutdown)
        {}

        let report = fx.service.recover().await.unwrap();
        assert_eq!(report.requeued, 1);
        assert_eq!(report.failed, 1);

        assert_eq!(fx.queue.dequeue().await, Dequeued::Job(queued_id));

        let orphan = fx.store.get(orphan_id).await.unwrap();
        assert_eq!(orphan.status, JobStatus::Failed);
        assert_eq!(orphan.progress, 30, "failure freezes progress");
        assert!(orphan
            .error_message
            .unwrap()
            .contains("interrupted by service restart"));
    }
}
