//! Queue repository interface
//!
//! Every status transition is a compare-and-set: the call reports whether
//! this caller won the transition. Duplicate deliveries lose the CAS and
//! observe a finished status instead.

use async_trait::async_trait;
use chrono::Duration;
use rust_decimal::Decimal;

use rate_model::{DeviceResult, QueueId, RatePlanId, SessionId};

use crate::error::QueueStoreError;
use crate::models::{OptimizationQueueRow, QueueStatus, WinningQueue};

#[async_trait]
pub trait QueueRepository: Send + Sync {
    async fn queue(&self, queue_id: QueueId)
        -> Result<Option<OptimizationQueueRow>, QueueStoreError>;

    /// Current status for each known queue id, in input order.
    async fn statuses(
        &self,
        queue_ids: &[QueueId],
    ) -> Result<Vec<(QueueId, QueueStatus)>, QueueStoreError>;

    /// CAS NotStarted -> Running. `false` means another worker holds it.
    async fn claim(&self, queue_id: QueueId) -> Result<bool, QueueStoreError>;

    /// CAS Running -> CompletedSuccess with the winning cost. `false` means a
    /// prior worker already finished the queue.
    async fn complete_success(
        &self,
        queue_id: QueueId,
        total_cost: Decimal,
    ) -> Result<bool, QueueStoreError>;

    /// CAS Running -> CompletedError with a typed reason.
    async fn complete_error(
        &self,
        queue_id: QueueId,
        reason: &str,
    ) -> Result<bool, QueueStoreError>;

    /// Persist per-device rows; only the CAS winner calls this, so rows for a
    /// queue are written exactly once.
    async fn record_device_results(
        &self,
        queue_id: QueueId,
        rows: &[DeviceResult],
    ) -> Result<(), QueueStoreError>;

    async fn device_results(
        &self,
        queue_id: QueueId,
    ) -> Result<Vec<DeviceResult>, QueueStoreError>;

    /// The queue's bound sequence, in sequence order.
    async fn sequence_plan_ids(
        &self,
        queue_id: QueueId,
    ) -> Result<Vec<RatePlanId>, QueueStoreError>;

    /// All queues belonging to a session, across its instances.
    async fn session_queues(
        &self,
        session_id: SessionId,
    ) -> Result<Vec<OptimizationQueueRow>, QueueStoreError>;

    /// Reclaim queues stuck Running longer than the cutoff; returns how many
    /// were moved to Abandoned.
    async fn abandon_stuck(&self, stuck_after: Duration) -> Result<u64, QueueStoreError>;

    /// Per communication group: the successful queue with the lowest total
    /// cost, ties broken by lowest queue id.
    async fn winning_queues(
        &self,
        session_id: SessionId,
    ) -> Result<Vec<WinningQueue>, QueueStoreError>;

    /// Drop device rows of non-winning queues; retention of losers is an
    /// external choice, so this is invoked only when configured.
    async fn purge_losing_results(&self, session_id: SessionId)
        -> Result<u64, QueueStoreError>;
}
