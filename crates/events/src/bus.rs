//! In-process progress bus backed by a `tokio::sync::broadcast` channel.
//!
//! [`ProgressBus`] fans job state changes out to any number of
//! subscribers (poll responders today, real-time transports later). It is
//! shared via `Arc<ProgressBus>` across the application.

use serde::Serialize;
use tokio::sync::broadcast;

use shield_core::job::JobStatus;
use shield_core::types::{JobId, Timestamp};

// ---------------------------------------------------------------------------
// ProgressEvent
// ---------------------------------------------------------------------------

/// A job state change, published after every successful store mutation.
///
/// Carries only the coordinates a consumer needs to decide whether to
/// re-read the job store; it is a cache-invalidation hint, not a record.
#[derive(Debug, Clone, Serialize)]
pub struct ProgressEvent {
    pub job_id: JobId,
    pub status: JobStatus,
    pub progress: u8,
    /// When the event was published (UTC).
    pub timestamp: Timestamp,
}

// ---------------------------------------------------------------------------
// ProgressBus
// ---------------------------------------------------------------------------

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 1024;

/// Fire-and-forget fan-out of job progress notifications.
///
/// Wraps a [`broadcast::Sender`] so that any number of subscribers can
/// independently receive every published event. When the buffer is full,
/// the oldest un-consumed events are dropped and slow receivers observe
/// `RecvError::Lagged` -- acceptable, because the job store remains the
/// single source of truth.
pub struct ProgressBus {
    sender: broadcast::Sender<ProgressEvent>,
}

impl ProgressBus {
    /// Create a bus with a specific channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish a state change to all current subscribers.
    ///
    /// If there are no active subscribers the event is silently dropped;
    /// a missed notification is never the sole source of truth.
    pub fn publish(&self, job_id: JobId, status: JobStatus, progress: u8) {
        // Ignore the SendError -- it only means there are zero receivers.
        let _ = self.sender.send(ProgressEvent {
            job_id,
            status,
            progress,
            timestamp: chrono::Utc::now(),
        });
    }

    /// Subscribe to all events published on this bus.
    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.sender.subscribe()
    }
}

impl Default for ProgressBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
