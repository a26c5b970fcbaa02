//! End-to-end runtime tests over the in-memory repository, checkpoint store,
//! and message bus: idempotent duplicate handling, continuation chaining,
//! checkpoint loss, and coordinator convergence.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Duration, NaiveDate};
use rust_decimal_macros::dec;

use assigner::QueueJob;
use checkpoint_store::{checkpoint_key, CheckpointStore, InMemoryCheckpointStore};
use message_bus::attrs::keys;
use message_bus::{queues, InMemoryMessageBus, MessageBus, WorkMessage, WorkOrder};
use queue_store::{
    InMemoryQueueRepository, OptimizationInstanceRow, OptimizationQueueRow, QueueRepository,
    QueueStatus,
};
use rate_model::{ChargeType, PortalType, QueueId, SessionId};
use test_utils::fixtures::{billing, data_plan, device, pool_collection};
use worker_runtime::{
    CoordinationOutcome, Coordinator, CoordinatorConfig, Disposition, InMemoryWorkloadLoader,
    NoopProgressSink, RetryPolicy, WorkerConfig, WorkerRuntime,
};

const SESSION: SessionId = 42;

struct Harness {
    repo: Arc<InMemoryQueueRepository>,
    checkpoints: Arc<InMemoryCheckpointStore>,
    bus: Arc<InMemoryMessageBus>,
    loader: Arc<InMemoryWorkloadLoader>,
    runtime: WorkerRuntime<InMemoryQueueRepository, InMemoryCheckpointStore, InMemoryMessageBus>,
}

fn worker_config() -> WorkerConfig {
    WorkerConfig {
        retry: RetryPolicy {
            base_delay_ms: 1,
            max_attempts: 2,
        },
        ..WorkerConfig::default()
    }
}

fn harness_with(config: WorkerConfig) -> Harness {
    let repo = Arc::new(InMemoryQueueRepository::new());
    let checkpoints = Arc::new(InMemoryCheckpointStore::new());
    let bus = Arc::new(InMemoryMessageBus::default());
    let loader = Arc::new(InMemoryWorkloadLoader::new());
    let runtime = WorkerRuntime::new(
        Arc::clone(&repo),
        Arc::clone(&checkpoints),
        Arc::clone(&bus),
        Arc::clone(&loader) as Arc<dyn worker_runtime::WorkloadLoader>,
        Arc::new(NoopProgressSink),
        config,
    );
    Harness {
        repo,
        checkpoints,
        bus,
        loader,
        runtime,
    }
}

fn harness() -> Harness {
    harness_with(worker_config())
}

fn sample_job(queue_id: QueueId) -> QueueJob {
    QueueJob {
        queue_id,
        pools: pool_collection(&[data_plan(10, dec!(10), dec!(1000), dec!(5), dec!(100))]),
        devices: vec![device(queue_id, 1, 10, dec!(100))],
        portal_type: PortalType::M2M,
        charge_type: ChargeType::BaseAndOverage,
        billing: billing(30),
        baseline: None,
    }
}

fn seed_queue(h: &Harness, queue_id: QueueId, comm_group_id: i64) {
    h.repo.seed_instance(OptimizationInstanceRow {
        id: 1,
        session_id: SESSION,
        service_provider_id: 7,
        portal_type: PortalType::M2M,
        is_customer_optimization: false,
        billing_period_start: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
        billing_period_end: NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
    });
    h.repo.seed_queue(
        OptimizationQueueRow::seeded(queue_id, 1, comm_group_id, 7),
        vec![10],
    );
}

fn work_message(queue_ids: Vec<QueueId>) -> WorkMessage {
    let order = WorkOrder {
        queue_ids,
        is_continuation: false,
        skip_lower_cost_check: false,
        charge_type: ChargeType::BaseAndOverage,
        session_id: SESSION,
        continuation_attempt: 0,
    };
    WorkMessage::new("{}", order.to_attributes())
}

fn generous() -> Duration {
    Duration::hours(1)
}

/// Zero host budget: the safety margin puts the deadline in the past, so the
/// assigner suspends before its first placement.
fn exhausted() -> Duration {
    Duration::zero()
}

async fn status_of(h: &Harness, queue_id: QueueId) -> QueueStatus {
    h.repo.queue(queue_id).await.unwrap().unwrap().status
}

#[tokio::test]
async fn fresh_run_records_result_and_finishes_queue() {
    let h = harness();
    seed_queue(&h, 1, 5);
    h.loader.insert(sample_job(1));

    let disposition = h
        .runtime
        .handle_message(&work_message(vec![1]), generous())
        .await
        .unwrap();
    assert_eq!(disposition, Disposition::Completed);

    let row = h.repo.queue(1).await.unwrap().unwrap();
    assert_eq!(row.status, QueueStatus::CompletedSuccess);
    assert_eq!(row.total_cost, Some(dec!(10)));
    assert_eq!(h.repo.device_results(1).await.unwrap().len(), 1);
}

#[tokio::test]
async fn duplicate_delivery_after_success_is_a_noop() {
    let h = harness();
    seed_queue(&h, 1, 5);
    h.loader.insert(sample_job(1));

    let message = work_message(vec![1]);
    h.runtime
        .handle_message(&message, generous())
        .await
        .unwrap();
    let first_results = h.repo.device_results(1).await.unwrap();

    // at-least-once delivery hands the same message to another worker
    let disposition = h
        .runtime
        .handle_message(&message, generous())
        .await
        .unwrap();
    assert_eq!(disposition, Disposition::Duplicate);

    let row = h.repo.queue(1).await.unwrap().unwrap();
    assert_eq!(row.total_cost, Some(dec!(10)));
    assert_eq!(h.repo.device_results(1).await.unwrap(), first_results);
}

#[tokio::test]
async fn expired_budget_chains_and_the_continuation_completes() {
    let h = harness();
    seed_queue(&h, 1, 5);
    h.loader.insert(sample_job(1));

    let disposition = h
        .runtime
        .handle_message(&work_message(vec![1]), exhausted())
        .await
        .unwrap();
    assert_eq!(disposition, Disposition::Continued);
    assert_eq!(status_of(&h, 1).await, QueueStatus::Running);

    let key = checkpoint_key(SESSION, &[1]);
    assert!(h.checkpoints.get(&key).await.unwrap().is_some());

    let chained = h
        .bus
        .receive(queues::OPTIMIZATION_WORK, 10, Duration::seconds(0))
        .await
        .unwrap();
    assert_eq!(chained.len(), 1);
    assert_eq!(chained[0].attribute(keys::IS_CHAINING_PROCESS), Some("true"));
    assert_eq!(chained[0].attribute(keys::CONTINUATION_ATTEMPT), Some("1"));

    let disposition = h
        .runtime
        .handle_message(&chained[0], generous())
        .await
        .unwrap();
    assert_eq!(disposition, Disposition::Completed);
    assert_eq!(status_of(&h, 1).await, QueueStatus::CompletedSuccess);
    assert_eq!(h.repo.device_results(1).await.unwrap().len(), 1);
    assert!(
        h.checkpoints.get(&key).await.unwrap().is_none(),
        "checkpoint must be deleted on completion"
    );
}

#[tokio::test]
async fn lost_checkpoint_fails_the_queue_set() {
    let h = harness();
    seed_queue(&h, 1, 5);
    h.repo.claim(1).await.unwrap();

    let order = WorkOrder {
        queue_ids: vec![1],
        is_continuation: false,
        skip_lower_cost_check: false,
        charge_type: ChargeType::BaseAndOverage,
        session_id: SESSION,
        continuation_attempt: 0,
    }
    .continuation(vec![1]);
    let message = WorkMessage::new("{}", order.to_attributes());

    let disposition = h
        .runtime
        .handle_message(&message, generous())
        .await
        .unwrap();
    assert_eq!(disposition, Disposition::Rejected);

    let row = h.repo.queue(1).await.unwrap().unwrap();
    assert_eq!(row.status, QueueStatus::CompletedError);
    assert_eq!(row.error_reason.as_deref(), Some("checkpoint lost"));
}

#[tokio::test]
async fn corrupt_checkpoint_is_treated_as_lost() {
    let h = harness();
    seed_queue(&h, 1, 5);
    h.repo.claim(1).await.unwrap();
    let key = checkpoint_key(SESSION, &[1]);
    h.checkpoints.put(&key, b"garbage", 60).await.unwrap();

    let order = WorkOrder {
        queue_ids: vec![1],
        is_continuation: true,
        skip_lower_cost_check: false,
        charge_type: ChargeType::BaseAndOverage,
        session_id: SESSION,
        continuation_attempt: 1,
    };
    let message = WorkMessage::new("{}", order.to_attributes());

    let disposition = h
        .runtime
        .handle_message(&message, generous())
        .await
        .unwrap();
    assert_eq!(disposition, Disposition::Rejected);
    assert_eq!(status_of(&h, 1).await, QueueStatus::CompletedError);
}

#[tokio::test]
async fn continuation_budget_exhaustion_forces_an_error_finish() {
    let h = harness_with(WorkerConfig {
        max_continuations: 0,
        ..worker_config()
    });
    seed_queue(&h, 1, 5);
    h.loader.insert(sample_job(1));

    // suspends immediately, but chaining is out of budget
    let disposition = h
        .runtime
        .handle_message(&work_message(vec![1]), exhausted())
        .await
        .unwrap();
    assert_eq!(disposition, Disposition::Completed);

    let row = h.repo.queue(1).await.unwrap().unwrap();
    assert_eq!(row.status, QueueStatus::CompletedError);
    assert_eq!(
        row.error_reason.as_deref(),
        Some("continuation budget exhausted")
    );
    assert_eq!(h.bus.len(queues::OPTIMIZATION_WORK).await, 0);
}

#[tokio::test]
async fn missing_workload_is_a_configuration_error() {
    let h = harness();
    seed_queue(&h, 1, 5);
    // loader has nothing for queue 1

    let disposition = h
        .runtime
        .handle_message(&work_message(vec![1]), generous())
        .await
        .unwrap();
    assert_eq!(disposition, Disposition::Rejected);

    let row = h.repo.queue(1).await.unwrap().unwrap();
    assert_eq!(row.status, QueueStatus::CompletedError);
    assert!(row.error_reason.unwrap().contains("no workload"));
}

#[tokio::test]
async fn generation_messages_are_routed_away() {
    let h = harness();
    seed_queue(&h, 1, 5);

    let mut attributes = HashMap::new();
    attributes.insert(keys::RATE_PLAN_SEQUENCES.to_string(), "[]".to_string());
    attributes.insert(keys::COMM_GROUP_ID.to_string(), "5".to_string());
    let message = WorkMessage::new("{}", attributes);

    let disposition = h
        .runtime
        .handle_message(&message, generous())
        .await
        .unwrap();
    assert_eq!(disposition, Disposition::GenerationRouted);
    assert_eq!(status_of(&h, 1).await, QueueStatus::NotStarted);
}

#[tokio::test]
async fn contended_claim_is_a_duplicate() {
    let h = harness();
    seed_queue(&h, 1, 5);
    h.loader.insert(sample_job(1));
    h.repo.claim(1).await.unwrap(); // another worker holds it

    let disposition = h
        .runtime
        .handle_message(&work_message(vec![1]), generous())
        .await
        .unwrap();
    assert_eq!(disposition, Disposition::Duplicate);
    assert_eq!(status_of(&h, 1).await, QueueStatus::Running);
}

#[tokio::test]
async fn a_batch_of_queues_finishes_together() {
    let h = harness();
    for queue_id in [1, 2, 3] {
        seed_queue(&h, queue_id, 5);
        h.loader.insert(sample_job(queue_id));
    }

    let disposition = h
        .runtime
        .handle_message(&work_message(vec![1, 2, 3]), generous())
        .await
        .unwrap();
    assert_eq!(disposition, Disposition::Completed);
    for queue_id in [1, 2, 3] {
        assert_eq!(status_of(&h, queue_id).await, QueueStatus::CompletedSuccess);
    }
}

fn coordinator_config() -> CoordinatorConfig {
    CoordinatorConfig {
        poll_backoff_secs: vec![0],
        max_poll_attempts: 2,
        stuck_after_secs: None,
        purge_losing_results: false,
    }
}

#[tokio::test]
async fn coordinator_emits_exactly_one_session_complete_event() {
    let h = harness();
    for (queue_id, cost) in [(1, dec!(30)), (2, dec!(25))] {
        seed_queue(&h, queue_id, 5);
        h.repo.claim(queue_id).await.unwrap();
        h.repo.complete_success(queue_id, cost).await.unwrap();
    }

    let coordinator = Coordinator::new(
        Arc::clone(&h.repo),
        Arc::clone(&h.bus),
        Arc::new(NoopProgressSink),
        coordinator_config(),
    );
    let outcome = coordinator.run_session(SESSION).await.unwrap();

    match outcome {
        CoordinationOutcome::Completed { winners } => {
            assert_eq!(winners.len(), 1);
            assert_eq!(winners[0].queue_id, 2);
        }
        other => panic!("expected completion, got {:?}", other),
    }
    assert_eq!(h.bus.len(queues::SESSION_COMPLETE).await, 1);
}

#[tokio::test]
async fn coordinator_stalls_on_an_unfinished_session() {
    let h = harness();
    seed_queue(&h, 1, 5);

    let coordinator = Coordinator::new(
        Arc::clone(&h.repo),
        Arc::clone(&h.bus),
        Arc::new(NoopProgressSink),
        coordinator_config(),
    );
    let outcome = coordinator.run_session(SESSION).await.unwrap();
    assert_eq!(outcome, CoordinationOutcome::Stalled);
    assert_eq!(h.bus.len(queues::SESSION_COMPLETE).await, 0);
}

#[tokio::test]
async fn coordinator_purges_losing_result_sets() {
    let h = harness();
    for (queue_id, cost) in [(1, dec!(30)), (2, dec!(25))] {
        seed_queue(&h, queue_id, 5);
        h.loader.insert(sample_job(queue_id));
        h.repo.claim(queue_id).await.unwrap();
        h.repo.complete_success(queue_id, cost).await.unwrap();
        h.repo
            .record_device_results(
                queue_id,
                &[rate_model::DeviceResult {
                    device_id: queue_id,
                    assigned_rate_plan_id: 10,
                    base_cost: cost,
                    overage_cost: dec!(0),
                    total_cost: cost,
                }],
            )
            .await
            .unwrap();
    }

    let coordinator = Coordinator::new(
        Arc::clone(&h.repo),
        Arc::clone(&h.bus),
        Arc::new(NoopProgressSink),
        CoordinatorConfig {
            purge_losing_results: true,
            ..coordinator_config()
        },
    );
    coordinator.run_session(SESSION).await.unwrap();

    assert!(h.repo.device_results(1).await.unwrap().is_empty());
    assert_eq!(h.repo.device_results(2).await.unwrap().len(), 1);
}
