//! Pipeline event types and EventBus
//!
//! Job lifecycle events are broadcast so that the CLI, tests and any
//! future front end can follow a job without polling the database.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Events emitted by the job orchestrator
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PipelineEvent {
    /// Job accepted and its chunks queued
    JobQueued {
        job_id: Uuid,
        /// "root_extraction" or "tokenization"
        kind: String,
        container: i64,
        chunks_total: usize,
        timestamp: DateTime<Utc>,
    },

    /// One chunk finished successfully
    ChunkCompleted {
        job_id: Uuid,
        chunk_id: usize,
        tokens_processed: u64,
        tokens_updated: u64,
        /// Completed chunks (success or failure) over total
        progress_percent: f64,
        timestamp: DateTime<Utc>,
    },

    /// One chunk failed, timed out, panicked or was cancelled
    ChunkFailed {
        job_id: Uuid,
        chunk_id: usize,
        error: String,
        progress_percent: f64,
        timestamp: DateTime<Utc>,
    },

    /// All chunks reported and the aggregate was written
    JobFinalized {
        job_id: Uuid,
        tokens_processed: u64,
        tokens_updated: u64,
        chunks_succeeded: usize,
        chunks_failed: usize,
        timestamp: DateTime<Utc>,
    },

    /// Job could not run or could not finalize
    JobFailed {
        job_id: Uuid,
        error: String,
        timestamp: DateTime<Utc>,
    },
}

impl PipelineEvent {
    /// Job this event belongs to
    pub fn job_id(&self) -> Uuid {
        match self {
            PipelineEvent::JobQueued { job_id, .. }
            | PipelineEvent::ChunkCompleted { job_id, .. }
            | PipelineEvent::ChunkFailed { job_id, .. }
            | PipelineEvent::JobFinalized { job_id, .. }
            | PipelineEvent::JobFailed { job_id, .. } => *job_id,
        }
    }

    /// True for events after which no further events arrive for the job
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PipelineEvent::JobFinalized { .. } | PipelineEvent::JobFailed { .. }
        )
    }
}

/// Broadcast bus for pipeline events
///
/// Cloning shares the same underlying channel.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<PipelineEvent>,
}

impl EventBus {
    /// Creates a new EventBus buffering `capacity` events per subscriber
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.tx.subscribe()
    }

    /// Emit an event, ignoring the no-subscriber case
    pub fn emit_lossy(&self, event: PipelineEvent) {
        let _ = self.tx.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscriber_receives_event() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();
        let job_id = Uuid::new_v4();

        bus.emit_lossy(PipelineEvent::JobFailed {
            job_id,
            error: "boom".to_string(),
            timestamp: Utc::now(),
        });

        let event = rx.recv().await.unwrap();
        assert_eq!(event.job_id(), job_id);
        assert!(event.is_terminal());
    }

    #[test]
    fn test_emit_without_subscribers() {
        let bus = EventBus::new(4);
        let event = PipelineEvent::JobQueued {
            job_id: Uuid::nil(),
            kind: "tokenization".to_string(),
            container: 1,
            chunks_total: 1,
            timestamp: Utc::now(),
        };

        bus.emit_lossy(event.clone());

        // Late subscribers only see what comes after them
        let mut rx = bus.subscribe();
        assert!(rx.try_recv().is_err());
        bus.emit_lossy(event);
        assert_eq!(rx.try_recv().unwrap().job_id(), Uuid::nil());
    }

    #[test]
    fn test_event_serializes_with_type_tag() {
        let event = PipelineEvent::ChunkFailed {
            job_id: Uuid::nil(),
            chunk_id: 3,
            error: "timeout".to_string(),
            progress_percent: 50.0,
            timestamp: Utc::now(),
        };

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "ChunkFailed");
        assert_eq!(json["chunk_id"], 3);
        assert!(!event.is_terminal());
    }
}
