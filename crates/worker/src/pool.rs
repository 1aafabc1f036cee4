//! Worker pool lifecycle.

use std::sync::Arc;
use std::time::Duration;

use shield_core::queue::{Dequeued, JobQueue};
use shield_core::store::JobStore;
use shield_core::vault::KeyVault;
use shield_engine::TransformEngine;
use shield_events::ProgressBus;

use crate::processor::process_job;

/// Tunables for the pool and per-job processing.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Number of concurrent worker tasks.
    pub workers: usize,
    /// Wall-clock bound on a single engine invocation.
    pub transform_timeout: Duration,
    /// Optional expiry applied to vaulted key material.
    pub key_ttl: Option<Duration>,
    /// How often estimated progress is written while the engine runs.
    pub progress_interval: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            workers: 2,
            transform_timeout: Duration::from_secs(45),
            key_ttl: None,
            progress_interval: Duration::from_secs(2),
        }
    }
}

/// Everything a worker needs, cheaply cloneable into each task.
#[derive(Clone)]
pub struct WorkerContext {
    pub store: Arc<dyn JobStore>,
    pub vault: Arc<dyn KeyVault>,
    pub queue: Arc<JobQueue>,
    pub engine: Arc<dyn TransformEngine>,
    pub progress: Arc<ProgressBus>,
    pub config: WorkerConfig,
}

/// A running pool of worker tasks.
pub struct WorkerPool {
    queue: Arc<JobQueue>,
    handles: Vec<tokio::task::JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `config.workers` tasks, each looping dequeue -> process.
    pub fn spawn(ctx: WorkerContext) -> Self {
        let queue = Arc::clone(&ctx.queue);
        let handles = (0..ctx.config.workers.max(1))
            .map(|worker| {
                let ctx = ctx.clone();
                tokio::spawn(run_worker(worker, ctx))
            })
            .collect();
        tracing::info!(workers = ctx.config.workers.max(1), "Worker pool started");
        Self { queue, handles }
    }

    /// Signal shutdown and wait for every worker to exit.
    ///
    /// A worker mid-transform observes the signal only at its next
    /// dequeue, so the in-flight job always runs to a terminal state.
    /// Queued-but-undequeued jobs stay `Queued` in the store for the next
    /// process start.
    pub async fn shutdown(self) {
        self.queue.shutdown();
        for (worker, result) in futures::future::join_all(self.handles)
            .await
            .into_iter()
            .enumerate()
        {
            if let Err(e) = result {
                tracing::error!(worker, error = %e, "Worker task panicked");
            }
        }
        tracing::info!("Worker pool stopped");
    }
}

/// One worker's loop: block on the queue, process, repeat until shutdown.
async fn run_worker(worker: usize, ctx: WorkerContext) {
    tracing::info!(worker, "Worker started");
    loop {
        match ctx.queue.dequeue().await {
            Dequeued::Shutdown => break,
            Dequeued::Job(job_id) => {
                // A failed iteration is logged and abandoned; one bad job
                // never takes the pool down.
                if let Err(e) = process_job(&ctx, job_id).await {
                    tracing::error!(worker, job_id = %job_id, error = %e, "Job processing aborted");
                }
            }
        }
    }
    tracing::info!(worker, "Worker stopped");
}
