//! Progress reporting
//!
//! Progress is reported only at well-defined phase transitions. The sink is
//! a passive collaborator: it cannot fail the optimization, so the trait is
//! infallible and implementations swallow their own errors.

use async_trait::async_trait;
use log::info;
use uuid::Uuid;

use queue_store::QueueStatus;
use rate_model::{QueueId, SessionId};

#[derive(Debug, Clone)]
pub enum ProgressEvent {
    /// A sequence-generation message reached the worker lane and was routed away
    GenerationRouted { message_id: Uuid },
    QueuesClaimed { queue_ids: Vec<QueueId> },
    CheckpointPersisted {
        key: String,
        remaining: Vec<QueueId>,
        progress_percent: f64,
    },
    QueueFinalized {
        queue_id: QueueId,
        status: QueueStatus,
    },
    SessionComplete { session_id: SessionId },
    SessionStalled { session_id: SessionId },
}

#[async_trait]
pub trait ProgressSink: Send + Sync {
    async fn report(&self, event: ProgressEvent);
}

/// Discards all events
pub struct NoopProgressSink;

#[async_trait]
impl ProgressSink for NoopProgressSink {
    async fn report(&self, _event: ProgressEvent) {}
}

/// Logs events at info level
pub struct LogProgressSink;

#[async_trait]
impl ProgressSink for LogProgressSink {
    async fn report(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::GenerationRouted { message_id } => {
                info!("routed sequence-generation message {}", message_id);
            }
            ProgressEvent::QueuesClaimed { queue_ids } => {
                info!("claimed queues {:?}", queue_ids);
            }
            ProgressEvent::CheckpointPersisted {
                key,
                remaining,
                progress_percent,
            } => {
                info!(
                    "checkpointed {} ({} queue(s) remaining, {:.1}% done)",
                    key,
                    remaining.len(),
                    progress_percent
                );
            }
            ProgressEvent::QueueFinalized { queue_id, status } => {
                info!("queue {} finalized as {}", queue_id, status.as_str());
            }
            ProgressEvent::SessionComplete { session_id } => {
                info!("session {} complete", session_id);
            }
            ProgressEvent::SessionStalled { session_id } => {
                info!("session {} stalled", session_id);
            }
        }
    }
}
