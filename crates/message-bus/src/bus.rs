//! Message bus interface

use async_trait::async_trait;
use chrono::Duration;
use uuid::Uuid;

use crate::error::BusError;
use crate::message::WorkMessage;

/// Queue names used by the optimization pipeline
pub mod queues {
    /// Ingress for assigner work and continuations
    pub const OPTIMIZATION_WORK: &str = "optimization.work";
    /// Distributed sequence-generation jobs (orchestrator lane)
    pub const SEQUENCE_GENERATION: &str = "optimization.sequence-generation";
    /// Terminal event consumed by downstream cleanup
    pub const SESSION_COMPLETE: &str = "optimization.session-complete";

    /// Dead-letter queue name for a source queue.
    pub fn dead_letter(queue: &str) -> String {
        format!("{}.dead-letter", queue)
    }
}

/// Abstract at-least-once message bus.
///
/// A received message stays invisible for the visibility timeout; unless it
/// is deleted in time it is redelivered. The timeout must exceed the worker's
/// maximum runtime plus its safety margin.
#[async_trait]
pub trait MessageBus: Send + Sync {
    async fn send(&self, queue: &str, message: WorkMessage) -> Result<(), BusError>;

    async fn receive(
        &self,
        queue: &str,
        max_messages: usize,
        visibility_timeout: Duration,
    ) -> Result<Vec<WorkMessage>, BusError>;

    /// Acknowledge: remove the message for good.
    async fn delete(&self, queue: &str, message_id: Uuid) -> Result<(), BusError>;

    /// Extend or shorten the lease on an in-flight message, e.g. to return
    /// it to the queue early once a worker knows it will not finish it.
    async fn change_visibility(
        &self,
        queue: &str,
        message_id: Uuid,
        visibility_timeout: Duration,
    ) -> Result<(), BusError>;
}
