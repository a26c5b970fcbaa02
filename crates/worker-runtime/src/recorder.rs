//! At-most-once result recording
//!
//! The status CAS is the gate: a queue's device rows are written only by the
//! single worker that wins the Running -> CompletedSuccess transition, so
//! duplicate deliveries can never produce a second result set.

use std::sync::Arc;

use log::info;
use rust_decimal::Decimal;

use queue_store::{QueueRepository, QueueStoreError};
use rate_model::{QueueId, QueueResult};

pub struct ResultRecorder<R: QueueRepository> {
    repo: Arc<R>,
}

impl<R: QueueRepository> ResultRecorder<R> {
    pub fn new(repo: Arc<R>) -> Self {
        Self { repo }
    }

    /// Record a winning result. Returns `false` when the CAS lost, meaning a
    /// prior worker already finished the queue and the rows were skipped.
    pub async fn record(
        &self,
        queue_id: QueueId,
        result: &QueueResult,
        objective_cost: Decimal,
    ) -> Result<bool, QueueStoreError> {
        if !self.repo.complete_success(queue_id, objective_cost).await? {
            info!(
                "queue {} already finished; skipping duplicate result",
                queue_id
            );
            return Ok(false);
        }
        self.repo
            .record_device_results(queue_id, &result.device_results)
            .await?;
        Ok(true)
    }
}
