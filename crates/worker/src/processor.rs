//! Per-job processing: one worker iteration of the job lifecycle.
//!
//! Engine, vault, and filesystem failures are recorded on the job
//! (`Failed` + error message) -- the submitter already has a job id and is
//! polling. Only store-level failures (including `InvalidTransition`,
//! always a defect) propagate out of [`process_job`] to be logged by the
//! pool.

use std::time::{Duration, Instant};

use shield_core::job::{Job, JobParams, JobStatus};
use shield_core::store::{JobStore, StoreError};
use shield_core::types::{JobId, KeyId};
use shield_core::vault::{KeyVault, VaultError};
use shield_engine::{TransformEngine, TransformOutcome, TransformRequest};
use shield_service::artifacts::{key_path_for, output_path_for};

use crate::pool::WorkerContext;

/// Estimated progress never exceeds this while the engine is running;
/// the remaining points belong to the terminal transition.
const PROGRESS_ENGINE_CAP: u64 = 90;

#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// What a successful transform leaves behind for the job record.
struct TransformProducts {
    output_ref: String,
    key_ref: Option<KeyId>,
}

/// Process one dequeued job id to a terminal state.
///
/// Idempotent-safe under duplicate delivery: a job whose status is no
/// longer `Queued` is skipped, so a redelivered id (crash recovery, queue
/// replay) either no-ops against a terminal job or re-runs cleanly from
/// `Queued`.
pub async fn process_job(ctx: &WorkerContext, job_id: JobId) -> Result<(), WorkerError> {
    let job = match ctx.store.get(job_id).await {
        Ok(job) => job,
        Err(StoreError::NotFound) => {
            tracing::warn!(job_id = %job_id, "Dequeued id has no job record, skipping");
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    // Duplicate-delivery guard.
    if job.status != JobStatus::Queued {
        tracing::debug!(job_id = %job_id, status = %job.status, "Job already claimed, skipping");
        return Ok(());
    }

    let job = ctx
        .store
        .update_status(job_id, JobStatus::Processing, 0, None)
        .await?;
    ctx.progress.publish(job_id, job.status, job.progress);
    tracing::info!(job_id = %job_id, kind = job.kind().as_str(), "Job claimed");

    match run_transform(ctx, &job).await {
        Ok(products) => {
            // Outputs are recorded before the terminal transition so no
            // reader ever sees Completed without locators.
            ctx.store
                .set_outputs(job_id, products.output_ref, products.key_ref)
                .await?;
            let job = ctx
                .store
                .update_status(job_id, JobStatus::Completed, 100, None)
                .await?;
            ctx.progress.publish(job_id, job.status, job.progress);
            tracing::info!(job_id = %job_id, "Job completed");
        }
        Err(message) => {
            // Re-read for the freshest progress; the store freezes it on
            // the Failed transition regardless.
            let current = ctx.store.get(job_id).await?;
            let job = ctx
                .store
                .update_status(job_id, JobStatus::Failed, current.progress, Some(message))
                .await?;
            ctx.progress.publish(job_id, job.status, job.progress);
            tracing::warn!(
                job_id = %job_id,
                error = job.error_message.as_deref().unwrap_or(""),
                "Job failed",
            );
        }
    }

    Ok(())
}

/// Prepare inputs, drive the engine, and bank the products.
///
/// Any `Err` is the human-readable message the job fails with.
async fn run_transform(ctx: &WorkerContext, job: &Job) -> Result<TransformProducts, String> {
    let output_path = output_path_for(&job.input_ref, job.kind());
    let key_path = key_path_for(&job.input_ref);

    // Decrypt jobs materialize their key from the vault first; owner and
    // expiry are enforced here, which is where an expired key turns into
    // an asynchronous job failure.
    if let JobParams::Decrypt { key_id } = &job.params {
        let material = ctx
            .vault
            .retrieve(*key_id, job.owner_id)
            .await
            .map_err(|e| match e {
                VaultError::Expired => "encryption key expired".to_string(),
                VaultError::Forbidden => "encryption key belongs to another owner".to_string(),
                VaultError::NotFound => "encryption key no longer exists".to_string(),
                other => format!("key vault failure: {other}"),
            })?;
        tokio::fs::write(&key_path, &material)
            .await
            .map_err(|e| format!("failed to stage key artifact: {e}"))?;
    }

    let request = TransformRequest {
        kind: job.kind(),
        input_path: job.input_ref.clone().into(),
        output_path: output_path.clone(),
        purity: job.params.purity(),
        key_path: Some(key_path.clone()),
        timeout: ctx.config.transform_timeout,
    };

    let outcome = drive_engine(ctx, job, request).await;

    match &job.params {
        JobParams::Decrypt { .. } => {
            // The staged key copy is only needed for the engine run.
            let _ = tokio::fs::remove_file(&key_path).await;
            let outcome = outcome?;
            Ok(TransformProducts {
                output_ref: outcome.output_path.to_string_lossy().into_owned(),
                key_ref: None,
            })
        }
        JobParams::Encrypt { .. } => {
            let outcome = outcome?;
            let key_artifact = outcome
                .key_path
                .ok_or_else(|| "engine returned no key artifact".to_string())?;
            let material = tokio::fs::read(&key_artifact)
                .await
                .map_err(|e| format!("failed to read key artifact: {e}"))?;

            // Vault before outputs: a Completed encrypt job always has a
            // retrievable key record behind its key_ref.
            let key_id = ctx
                .vault
                .store(job.id, job.owner_id, &material, ctx.config.key_ttl)
                .await
                .map_err(|e| format!("failed to vault key material: {e}"))?;

            // Raw key material must not linger on disk once vaulted.
            let _ = tokio::fs::remove_file(&key_artifact).await;

            Ok(TransformProducts {
                output_ref: outcome.output_path.to_string_lossy().into_owned(),
                key_ref: Some(key_id),
            })
        }
    }
}

/// Run the engine while periodically writing estimated progress.
async fn drive_engine(
    ctx: &WorkerContext,
    job: &Job,
    request: TransformRequest,
) -> Result<TransformOutcome, String> {
    let estimated_secs = job.params.estimated_duration_secs();
    let started = Instant::now();

    let mut ticker = tokio::time::interval(ctx.config.progress_interval);
    // The first tick completes immediately; consume it.
    ticker.tick().await;

    let engine_run = ctx.engine.run(request);
    tokio::pin!(engine_run);

    loop {
        tokio::select! {
            result = &mut engine_run => {
                return result.map_err(|e| e.to_string());
            }
            _ = ticker.tick() => {
                let pct = estimate_progress(started.elapsed(), estimated_secs);
                match ctx.store.update_status(job.id, JobStatus::Processing, pct, None).await {
                    Ok(updated) => ctx.progress.publish(job.id, updated.status, updated.progress),
                    // A progress write must never kill the transform.
                    Err(e) => tracing::error!(job_id = %job.id, error = %e, "Progress update failed"),
                }
            }
        }
    }
}

/// Map elapsed wall-clock onto `0..=90`.
///
/// The engine exposes no native progress, so the estimate is time-based
/// against the per-purity expected duration and saturates at the cap
/// until the terminal transition claims the rest.
fn estimate_progress(elapsed: Duration, estimated_secs: u64) -> u8 {
    let estimated_ms = estimated_secs.max(1) * 1000;
    let elapsed_ms = elapsed.as_millis() as u64;
    (elapsed_ms * PROGRESS_ENGINE_CAP / estimated_ms).min(PROGRESS_ENGINE_CAP) as u8
}
