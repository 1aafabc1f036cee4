//! PostgreSQL-backed job store and key vault.
//!
//! Transition atomicity is enforced by re-reading the row under
//! `SELECT ... FOR UPDATE` inside a transaction and applying the shared
//! state-machine logic from `shield_core::store` before writing, so two
//! racing updaters to one job are serialized by the row lock and the
//! loser's illegal edge is rejected, not silently applied.
//!
//! These implementations are exercised against a live database; hermetic
//! tests run against the [`memory`](crate::memory) backend instead.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::FromRow;
use uuid::Uuid;

use shield_core::job::{Job, JobParams, JobStatus};
use shield_core::keywrap::{KeyWrapper, WrappedKey};
use shield_core::store::{apply_set_outputs, apply_status_update, JobStore, StoreError};
use shield_core::types::{JobId, KeyId, OwnerId};
use shield_core::vault::{check_access, KeyVault, VaultError};

pub type DbPool = sqlx::PgPool;

/// Create a connection pool from a database URL.
pub async fn create_pool(database_url: &str) -> Result<DbPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(20)
        .connect(database_url)
        .await
}

/// Apply pending migrations from `crates/store/migrations`.
pub async fn run_migrations(pool: &DbPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}

// ---------------------------------------------------------------------------
// Job store
// ---------------------------------------------------------------------------

/// Column list for `jobs` queries.
const JOB_COLUMNS: &str = "\
    id, status, progress, params, input_ref, output_ref, key_ref, \
    error_message, owner_id, created_at, updated_at";

/// A row from the `jobs` table.
#[derive(Debug, FromRow)]
struct JobRow {
    id: Uuid,
    status: String,
    progress: i16,
    params: serde_json::Value,
    input_ref: String,
    output_ref: Option<String>,
    key_ref: Option<Uuid>,
    error_message: Option<String>,
    owner_id: Option<Uuid>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<JobRow> for Job {
    type Error = StoreError;

    fn try_from(row: JobRow) -> Result<Self, StoreError> {
        let params: JobParams = serde_json::from_value(row.params)
            .map_err(|e| StoreError::Unavailable(format!("corrupt job params: {e}")))?;
        let status = JobStatus::parse(&row.status)
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Ok(Job {
            id: row.id,
            params,
            status,
            progress: row.progress.clamp(0, 100) as u8,
            input_ref: row.input_ref,
            output_ref: row.output_ref,
            key_ref: row.key_ref,
            error_message: row.error_message,
            owner_id: row.owner_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn store_unavailable(err: sqlx::Error) -> StoreError {
    StoreError::Unavailable(err.to_string())
}

pub struct PgJobStore {
    pool: DbPool,
}

impl PgJobStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Lock and load a job row inside `tx`.
    async fn lock_job(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        id: JobId,
    ) -> Result<Job, StoreError> {
        let query = format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = $1 FOR UPDATE");
        let row: Option<JobRow> = sqlx::query_as(&query)
            .bind(id)
            .fetch_optional(&mut **tx)
            .await
            .map_err(store_unavailable)?;
        row.ok_or(StoreError::NotFound)?.try_into()
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn create(&self, job: Job) -> Result<JobId, StoreError> {
        let params = serde_json::to_value(&job.params)
            .map_err(|e| StoreError::Unavailable(format!("unserializable job params: {e}")))?;
        let result = sqlx::query(
            "INSERT INTO jobs \
                 (id, kind, status, progress, params, input_ref, owner_id, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(job.id)
        .bind(job.kind().as_str())
        .bind(job.status.as_str())
        .bind(job.progress as i16)
        .bind(params)
        .bind(&job.input_ref)
        .bind(job.owner_id)
        .bind(job.created_at)
        .bind(job.updated_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(job.id),
            Err(sqlx::Error::Database(db_err)) if db_err.code().as_deref() == Some("23505") => {
                Err(StoreError::Conflict(format!("job {} already exists", job.id)))
            }
            Err(err) => Err(store_unavailable(err)),
        }
    }

    async fn get(&self, id: JobId) -> Result<Job, StoreError> {
        let query = format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = $1");
        let row: Option<JobRow> = sqlx::query_as(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_unavailable)?;
        row.ok_or(StoreError::NotFound)?.try_into()
    }

    async fn update_status(
        &self,
        id: JobId,
        status: JobStatus,
        progress: u8,
        error_message: Option<String>,
    ) -> Result<Job, StoreError> {
        let mut tx = self.pool.begin().await.map_err(store_unavailable)?;
        let job = Self::lock_job(&mut tx, id).await?;
        let updated = apply_status_update(&job, status, progress, error_message, Utc::now())?;

        sqlx::query(
            "UPDATE jobs \
             SET status = $2, progress = $3, error_message = $4, updated_at = $5 \
             WHERE id = $1",
        )
        .bind(id)
        .bind(updated.status.as_str())
        .bind(updated.progress as i16)
        .bind(&updated.error_message)
        .bind(updated.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(store_unavailable)?;

        tx.commit().await.map_err(store_unavailable)?;
        Ok(updated)
    }

    async fn set_outputs(
        &self,
        id: JobId,
        output_ref: String,
        key_ref: Option<KeyId>,
    ) -> Result<Job, StoreError> {
        let mut tx = self.pool.begin().await.map_err(store_unavailable)?;
        let job = Self::lock_job(&mut tx, id).await?;
        let updated = apply_set_outputs(&job, output_ref, key_ref, Utc::now())?;

        sqlx::query(
            "UPDATE jobs SET output_ref = $2, key_ref = $3, updated_at = $4 WHERE id = $1",
        )
        .bind(id)
        .bind(&updated.output_ref)
        .bind(updated.key_ref)
        .bind(updated.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(store_unavailable)?;

        tx.commit().await.map_err(store_unavailable)?;
        Ok(updated)
    }

    async fn list_by_status(&self, status: JobStatus) -> Result<Vec<Job>, StoreError> {
        let query =
            format!("SELECT {JOB_COLUMNS} FROM jobs WHERE status = $1 ORDER BY created_at ASC");
        let rows: Vec<JobRow> = sqlx::query_as(&query)
            .bind(status.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(store_unavailable)?;
        rows.into_iter().map(Job::try_from).collect()
    }
}

// ---------------------------------------------------------------------------
// Key vault
// ---------------------------------------------------------------------------

/// A row from the `encryption_keys` table.
#[derive(Debug, FromRow)]
struct KeyRow {
    owner_id: Option<Uuid>,
    secret_version: i16,
    salt: Vec<u8>,
    key_material: Vec<u8>,
    expires_at: Option<DateTime<Utc>>,
    revoked_at: Option<DateTime<Utc>>,
}

fn vault_unavailable(err: sqlx::Error) -> VaultError {
    VaultError::Unavailable(err.to_string())
}

pub struct PgKeyVault {
    pool: DbPool,
    wrapper: KeyWrapper,
}

impl PgKeyVault {
    pub fn new(pool: DbPool, wrapper: KeyWrapper) -> Self {
        Self { pool, wrapper }
    }
}

#[async_trait]
impl KeyVault for PgKeyVault {
    async fn store(
        &self,
        job_id: JobId,
        owner_id: Option<OwnerId>,
        material: &[u8],
        ttl: Option<Duration>,
    ) -> Result<KeyId, VaultError> {
        let wrapped = self.wrapper.wrap(material)?;
        let key_id = Uuid::new_v4();
        let expires_at = ttl.map(|ttl| {
            Utc::now() + chrono::Duration::from_std(ttl).unwrap_or_default()
        });

        let result = sqlx::query(
            "INSERT INTO encryption_keys \
                 (id, job_id, owner_id, secret_version, salt, key_material, expires_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(key_id)
        .bind(job_id)
        .bind(owner_id)
        .bind(wrapped.secret_version)
        .bind(&wrapped.salt)
        .bind(&wrapped.ciphertext)
        .bind(expires_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(key_id),
            // uq_encryption_keys_job_id: one key record per job, ever.
            Err(sqlx::Error::Database(db_err)) if db_err.code().as_deref() == Some("23505") => {
                Err(VaultError::Conflict(format!(
                    "job {job_id} already has a key record"
                )))
            }
            Err(err) => Err(vault_unavailable(err)),
        }
    }

    async fn retrieve(
        &self,
        key_id: KeyId,
        requesting_owner: Option<OwnerId>,
    ) -> Result<Vec<u8>, VaultError> {
        let row: Option<KeyRow> = sqlx::query_as(
            "SELECT owner_id, secret_version, salt, key_material, expires_at, revoked_at \
             FROM encryption_keys WHERE id = $1",
        )
        .bind(key_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(vault_unavailable)?;

        let row = row.ok_or(VaultError::NotFound)?;
        check_access(
            row.owner_id,
            requesting_owner,
            row.expires_at,
            row.revoked_at,
            Utc::now(),
        )?;

        self.wrapper.unwrap(&WrappedKey {
            secret_version: row.secret_version,
            salt: row.salt,
            ciphertext: row.key_material,
        })
    }

    async fn revoke(&self, key_id: KeyId) -> Result<(), VaultError> {
        let result = sqlx::query(
            "UPDATE encryption_keys SET revoked_at = COALESCE(revoked_at, NOW()) WHERE id = $1",
        )
        .bind(key_id)
        .execute(&self.pool)
        .await
        .map_err(vault_unavailable)?;

        if result.rows_affected() == 0 {
            return Err(VaultError::NotFound);
        }
        Ok(())
    }

    async fn exists(&self, key_id: KeyId) -> Result<bool, VaultError> {
        let found: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM encryption_keys WHERE id = $1)")
                .bind(key_id)
                .fetch_one(&self.pool)
                .await
                .map_err(vault_unavailable)?;
        Ok(found)
    }
}
