//! Job service façade and artifact storage collaborator.
//!
//! [`JobService`] is the single entry point the HTTP layer talks to:
//! submissions are validated, their artifacts persisted, the job record
//! created and enqueued; status and result reads are cheap projections of
//! the job store. [`artifacts`] owns the on-disk layout of per-job
//! working directories.

pub mod artifacts;
pub mod service;

pub use artifacts::{ArtifactError, ArtifactStore, LocalArtifactStore};
pub use service::{
    JobResult, JobService, JobView, RecoveryReport, ServiceError, SubmitKind, SubmitRequest,
};
