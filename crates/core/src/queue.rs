//! FIFO hand-off of pending job ids from submission to workers.

use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

use crate::types::JobId;

/// Outcome of a blocking [`JobQueue::dequeue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dequeued {
    Job(JobId),
    /// The pool is shutting down; the caller should exit its loop.
    Shutdown,
}

/// In-process FIFO queue of pending job ids.
///
/// Safe for many concurrent producers and consumers: the receiver half is
/// guarded by a mutex, so each id is handed to exactly one worker at a
/// time. The queue itself is not durable -- ids still in flight when the
/// process dies are recovered from the job store's `Queued` rows at the
/// next start, and workers guard against duplicate delivery by checking
/// job status before claiming.
pub struct JobQueue {
    tx: mpsc::UnboundedSender<JobId>,
    rx: Mutex<mpsc::UnboundedReceiver<JobId>>,
    shutdown: CancellationToken,
}

impl JobQueue {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Mutex::new(rx),
            shutdown: CancellationToken::new(),
        }
    }

    /// Append a job id. Never blocks.
    pub fn enqueue(&self, id: JobId) {
        // The receiver lives as long as the queue, so this cannot fail.
        let _ = self.tx.send(id);
    }

    /// Wait for the next job id, or for shutdown, whichever comes first.
    pub async fn dequeue(&self) -> Dequeued {
        // `biased` makes shutdown win over a ready item, so no new work is
        // handed out once the signal fires.
        tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => Dequeued::Shutdown,
            mut rx = self.rx.lock() => {
                tokio::select! {
                    biased;
                    _ = self.shutdown.cancelled() => Dequeued::Shutdown,
                    item = rx.recv() => match item {
                        Some(id) => Dequeued::Job(id),
                        None => Dequeued::Shutdown,
                    },
                }
            }
        }
    }

    /// Signal all blocked and future dequeues to return [`Dequeued::Shutdown`].
    /// Undelivered ids stay in the channel and are dropped with the queue;
    /// their jobs remain `Queued` in the store for the next process start.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}

impl Default for JobQueue {
    fn default() -> Self {
        Self::new()
    }
}
