//! In-memory job store and key vault.
//!
//! Every mutation happens inside a single write-lock critical section, so
//! updates are atomic per record and serialized; a `get` issued after an
//! update returns never observes the prior state.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use shield_core::job::{Job, JobStatus};
use shield_core::keywrap::{KeyWrapper, WrappedKey};
use shield_core::store::{apply_set_outputs, apply_status_update, JobStore, StoreError};
use shield_core::types::{JobId, KeyId, OwnerId, Timestamp};
use shield_core::vault::{check_access, KeyVault, VaultError};

// ---------------------------------------------------------------------------
// Job store
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryJobStore {
    jobs: RwLock<HashMap<JobId, Job>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn create(&self, job: Job) -> Result<JobId, StoreError> {
        let mut jobs = self.jobs.write().await;
        if jobs.contains_key(&job.id) {
            return Err(StoreError::Conflict(format!(
                "job {} already exists",
                job.id
            )));
        }
        let id = job.id;
        jobs.insert(id, job);
        Ok(id)
    }

    async fn get(&self, id: JobId) -> Result<Job, StoreError> {
        self.jobs
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn update_status(
        &self,
        id: JobId,
        status: JobStatus,
        progress: u8,
        error_message: Option<String>,
    ) -> Result<Job, StoreError> {
        let mut jobs = self.jobs.write().await;
        let job = jobs.get(&id).ok_or(StoreError::NotFound)?;
        let updated = apply_status_update(job, status, progress, error_message, chrono::Utc::now())?;
        jobs.insert(id, updated.clone());
        Ok(updated)
    }

    async fn set_outputs(
        &self,
        id: JobId,
        output_ref: String,
        key_ref: Option<KeyId>,
    ) -> Result<Job, StoreError> {
        let mut jobs = self.jobs.write().await;
        let job = jobs.get(&id).ok_or(StoreError::NotFound)?;
        let updated = apply_set_outputs(job, output_ref, key_ref, chrono::Utc::now())?;
        jobs.insert(id, updated.clone());
        Ok(updated)
    }

    async fn list_by_status(&self, status: JobStatus) -> Result<Vec<Job>, StoreError> {
        let jobs = self.jobs.read().await;
        let mut matching: Vec<Job> = jobs
            .values()
            .filter(|job| job.status == status)
            .cloned()
            .collect();
        matching.sort_by_key(|job| job.created_at);
        Ok(matching)
    }
}

// ---------------------------------------------------------------------------
// Key vault
// ---------------------------------------------------------------------------

struct KeyRecord {
    job_id: JobId,
    owner_id: Option<OwnerId>,
    wrapped: WrappedKey,
    expires_at: Option<Timestamp>,
    revoked_at: Option<Timestamp>,
}

pub struct MemoryKeyVault {
    wrapper: KeyWrapper,
    keys: RwLock<HashMap<KeyId, KeyRecord>>,
}

impl MemoryKeyVault {
    pub fn new(wrapper: KeyWrapper) -> Self {
        Self {
            wrapper,
            keys: RwLock::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl KeyVault for MemoryKeyVault {
    async fn store(
        &self,
        job_id: JobId,
        owner_id: Option<OwnerId>,
        material: &[u8],
        ttl: Option<Duration>,
    ) -> Result<KeyId, VaultError> {
        let wrapped = self.wrapper.wrap(material)?;
        let mut keys = self.keys.write().await;
        // One key record per job, ever.
        if keys.values().any(|record| record.job_id == job_id) {
            return Err(VaultError::Conflict(format!(
                "job {job_id} already has a key record"
            )));
        }
        let key_id = Uuid::new_v4();
        keys.insert(
            key_id,
            KeyRecord {
                job_id,
                owner_id,
                wrapped,
                expires_at: ttl.map(|ttl| {
                    chrono::Utc::now() + chrono::Duration::from_std(ttl).unwrap_or_default()
                }),
                revoked_at: None,
            },
        );
        Ok(key_id)
    }

    async fn retrieve(
        &self,
        key_id: KeyId,
        requesting_owner: Option<OwnerId>,
    ) -> Result<Vec<u8>, VaultError> {
        let keys = self.keys.read().await;
        let record = keys.get(&key_id).ok_or(VaultError::NotFound)?;
        check_access(
            record.owner_id,
            requesting_owner,
            record.expires_at,
            record.revoked_at,
            chrono::Utc::now(),
        )?;
        self.wrapper.unwrap(&record.wrapped)
    }

    async fn revoke(&self, key_id: KeyId) -> Result<(), VaultError> {
        let mut keys = self.keys.write().await;
        let record = keys.get_mut(&key_id).ok_or(VaultError::NotFound)?;
        record.revoked_at.get_or_insert_with(chrono::Utc::now);
        Ok(())
    }

    async fn exists(&self, key_id: KeyId) -> Result<bool, VaultError> {
        Ok(self.keys.read().await.contains_key(&key_id))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
