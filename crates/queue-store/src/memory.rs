//! In-memory queue repository for unit tests and local development
//!
//! Mirrors the Postgres CAS semantics: each transition checks the current
//! status under the map entry's lock, so duplicate claims lose exactly like
//! they do against the conditional UPDATE.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use dashmap::DashMap;
use rust_decimal::Decimal;

use rate_model::{DeviceResult, InstanceId, QueueId, RatePlanId, SessionId};

use crate::error::QueueStoreError;
use crate::models::{
    OptimizationInstanceRow, OptimizationQueueRow, QueueStatus, WinningQueue,
};
use crate::repository::QueueRepository;

#[derive(Default)]
pub struct InMemoryQueueRepository {
    queues: DashMap<QueueId, OptimizationQueueRow>,
    sequences: DashMap<QueueId, Vec<RatePlanId>>,
    results: DashMap<QueueId, Vec<DeviceResult>>,
    instances: DashMap<InstanceId, OptimizationInstanceRow>,
}

impl InMemoryQueueRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an instance row (normally the orchestrator's job).
    pub fn seed_instance(&self, instance: OptimizationInstanceRow) {
        self.instances.insert(instance.id, instance);
    }

    /// Seed a queue with its bound sequence.
    pub fn seed_queue(&self, queue: OptimizationQueueRow, sequence: Vec<RatePlanId>) {
        self.sequences.insert(queue.id, sequence);
        self.queues.insert(queue.id, queue);
    }

    fn transition(
        &self,
        queue_id: QueueId,
        expected: QueueStatus,
        apply: impl FnOnce(&mut OptimizationQueueRow),
    ) -> Result<bool, QueueStoreError> {
        let mut entry = self
            .queues
            .get_mut(&queue_id)
            .ok_or(QueueStoreError::QueueNotFound(queue_id))?;
        if entry.status != expected {
            return Ok(false);
        }
        apply(&mut entry);
        Ok(true)
    }
}

#[async_trait]
impl QueueRepository for InMemoryQueueRepository {
    async fn queue(
        &self,
        queue_id: QueueId,
    ) -> Result<Option<OptimizationQueueRow>, QueueStoreError> {
        Ok(self.queues.get(&queue_id).map(|q| q.value().clone()))
    }

    async fn statuses(
        &self,
        queue_ids: &[QueueId],
    ) -> Result<Vec<(QueueId, QueueStatus)>, QueueStoreError> {
        let mut out = Vec::with_capacity(queue_ids.len());
        for id in queue_ids {
            if let Some(q) = self.queues.get(id) {
                out.push((*id, q.status));
            }
        }
        Ok(out)
    }

    async fn claim(&self, queue_id: QueueId) -> Result<bool, QueueStoreError> {
        self.transition(queue_id, QueueStatus::NotStarted, |q| {
            q.status = QueueStatus::Running;
            q.started_at = Some(Utc::now());
        })
    }

    async fn complete_success(
        &self,
        queue_id: QueueId,
        total_cost: Decimal,
    ) -> Result<bool, QueueStoreError> {
        self.transition(queue_id, QueueStatus::Running, |q| {
            q.status = QueueStatus::CompletedSuccess;
            q.total_cost = Some(total_cost);
            q.completed_at = Some(Utc::now());
        })
    }

    async fn complete_error(
        &self,
        queue_id: QueueId,
        reason: &str,
    ) -> Result<bool, QueueStoreError> {
        self.transition(queue_id, QueueStatus::Running, |q| {
            q.status = QueueStatus::CompletedError;
            q.error_reason = Some(reason.to_string());
            q.completed_at = Some(Utc::now());
        })
    }

    async fn record_device_results(
        &self,
        queue_id: QueueId,
        rows: &[DeviceResult],
    ) -> Result<(), QueueStoreError> {
        self.results.insert(queue_id, rows.to_vec());
        Ok(())
    }

    async fn device_results(
        &self,
        queue_id: QueueId,
    ) -> Result<Vec<DeviceResult>, QueueStoreError> {
        Ok(self
            .results
            .get(&queue_id)
            .map(|r| r.value().clone())
            .unwrap_or_default())
    }

    async fn sequence_plan_ids(
        &self,
        queue_id: QueueId,
    ) -> Result<Vec<RatePlanId>, QueueStoreError> {
        Ok(self
            .sequences
            .get(&queue_id)
            .map(|s| s.value().clone())
            .unwrap_or_default())
    }

    async fn session_queues(
        &self,
        session_id: SessionId,
    ) -> Result<Vec<OptimizationQueueRow>, QueueStoreError> {
        let instance_ids: Vec<InstanceId> = self
            .instances
            .iter()
            .filter(|i| i.session_id == session_id)
            .map(|i| i.id)
            .collect();

        let mut queues: Vec<OptimizationQueueRow> = self
            .queues
            .iter()
            .filter(|q| instance_ids.contains(&q.instance_id))
            .map(|q| q.value().clone())
            .collect();
        queues.sort_by_key(|q| q.id);
        Ok(queues)
    }

    async fn abandon_stuck(&self, stuck_after: Duration) -> Result<u64, QueueStoreError> {
        let cutoff = Utc::now() - stuck_after;
        let mut reclaimed = 0;
        for mut entry in self.queues.iter_mut() {
            if entry.status == QueueStatus::Running
                && entry.started_at.map(|t| t < cutoff).unwrap_or(false)
            {
                entry.status = QueueStatus::Abandoned;
                reclaimed += 1;
            }
        }
        Ok(reclaimed)
    }

    async fn winning_queues(
        &self,
        session_id: SessionId,
    ) -> Result<Vec<WinningQueue>, QueueStoreError> {
        let queues = self.session_queues(session_id).await?;
        let mut winners: BTreeMap<i64, WinningQueue> = BTreeMap::new();
        for queue in queues {
            if queue.status != QueueStatus::CompletedSuccess {
                continue;
            }
            let total_cost = match queue.total_cost {
                Some(cost) => cost,
                None => continue,
            };
            let candidate = WinningQueue {
                comm_group_id: queue.comm_group_id,
                queue_id: queue.id,
                total_cost,
            };
            winners
                .entry(queue.comm_group_id)
                .and_modify(|current| {
                    if (candidate.total_cost, candidate.queue_id)
                        < (current.total_cost, current.queue_id)
                    {
                        *current = candidate.clone();
                    }
                })
                .or_insert(candidate.clone());
        }
        Ok(winners.into_values().collect())
    }

    async fn purge_losing_results(
        &self,
        session_id: SessionId,
    ) -> Result<u64, QueueStoreError> {
        let winners: Vec<QueueId> = self
            .winning_queues(session_id)
            .await?
            .into_iter()
            .map(|w| w.queue_id)
            .collect();
        let session_queue_ids: Vec<QueueId> = self
            .session_queues(session_id)
            .await?
            .into_iter()
            .map(|q| q.id)
            .collect();

        let mut purged = 0;
        for id in session_queue_ids {
            if !winners.contains(&id) && self.results.remove(&id).is_some() {
                purged += 1;
            }
        }
        Ok(purged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rate_model::PortalType;
    use rust_decimal_macros::dec;

    fn instance(id: InstanceId, session_id: SessionId) -> OptimizationInstanceRow {
        OptimizationInstanceRow {
            id,
            session_id,
            service_provider_id: 77,
            portal_type: PortalType::M2M,
            is_customer_optimization: false,
            billing_period_start: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            billing_period_end: NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
        }
    }

    fn repo_with_queue(queue_id: QueueId) -> InMemoryQueueRepository {
        let repo = InMemoryQueueRepository::new();
        repo.seed_instance(instance(1, 10));
        repo.seed_queue(
            OptimizationQueueRow::seeded(queue_id, 1, 5, 77),
            vec![100, 200],
        );
        repo
    }

    #[tokio::test]
    async fn claim_is_won_exactly_once() {
        let repo = repo_with_queue(1);
        assert!(repo.claim(1).await.unwrap());
        assert!(!repo.claim(1).await.unwrap(), "second claim must lose");
        assert_eq!(
            repo.queue(1).await.unwrap().unwrap().status,
            QueueStatus::Running
        );
    }

    #[tokio::test]
    async fn terminal_cas_is_won_exactly_once() {
        let repo = repo_with_queue(1);
        repo.claim(1).await.unwrap();
        assert!(repo.complete_success(1, dec!(42)).await.unwrap());
        assert!(
            !repo.complete_success(1, dec!(40)).await.unwrap(),
            "a finished queue must reject further transitions"
        );
        assert!(!repo.complete_error(1, "late").await.unwrap());

        let row = repo.queue(1).await.unwrap().unwrap();
        assert_eq!(row.status, QueueStatus::CompletedSuccess);
        assert_eq!(row.total_cost, Some(dec!(42)));
    }

    #[tokio::test]
    async fn error_transition_requires_running() {
        let repo = repo_with_queue(1);
        assert!(!repo.complete_error(1, "too early").await.unwrap());
        repo.claim(1).await.unwrap();
        assert!(repo.complete_error(1, "checkpoint lost").await.unwrap());
        let row = repo.queue(1).await.unwrap().unwrap();
        assert_eq!(row.error_reason.as_deref(), Some("checkpoint lost"));
    }

    #[tokio::test]
    async fn stuck_running_queues_are_abandoned() {
        let repo = repo_with_queue(1);
        repo.claim(1).await.unwrap();
        // backdate the claim
        repo.queues.get_mut(&1).unwrap().started_at =
            Some(Utc::now() - Duration::minutes(90));

        let reclaimed = repo.abandon_stuck(Duration::minutes(60)).await.unwrap();
        assert_eq!(reclaimed, 1);
        assert_eq!(
            repo.queue(1).await.unwrap().unwrap().status,
            QueueStatus::Abandoned
        );
    }

    #[tokio::test]
    async fn winner_is_lowest_cost_then_lowest_id() {
        let repo = InMemoryQueueRepository::new();
        repo.seed_instance(instance(1, 10));
        for (queue_id, cost) in [(1, dec!(30)), (2, dec!(25)), (3, dec!(25))] {
            repo.seed_queue(OptimizationQueueRow::seeded(queue_id, 1, 5, 77), vec![100]);
            repo.claim(queue_id).await.unwrap();
            repo.complete_success(queue_id, cost).await.unwrap();
        }

        let winners = repo.winning_queues(10).await.unwrap();
        assert_eq!(winners.len(), 1);
        assert_eq!(winners[0].queue_id, 2, "ties break to the lowest queue id");
        assert_eq!(winners[0].total_cost, dec!(25));
    }

    #[tokio::test]
    async fn purge_drops_only_losing_results() {
        let repo = InMemoryQueueRepository::new();
        repo.seed_instance(instance(1, 10));
        for (queue_id, cost) in [(1, dec!(30)), (2, dec!(25))] {
            repo.seed_queue(OptimizationQueueRow::seeded(queue_id, 1, 5, 77), vec![100]);
            repo.claim(queue_id).await.unwrap();
            repo.complete_success(queue_id, cost).await.unwrap();
            repo.record_device_results(
                queue_id,
                &[DeviceResult {
                    device_id: 1,
                    assigned_rate_plan_id: 100,
                    base_cost: cost,
                    overage_cost: dec!(0),
                    total_cost: cost,
                }],
            )
            .await
            .unwrap();
        }

        let purged = repo.purge_losing_results(10).await.unwrap();
        assert_eq!(purged, 1);
        assert!(repo.device_results(1).await.unwrap().is_empty());
        assert_eq!(repo.device_results(2).await.unwrap().len(), 1);
    }
}
