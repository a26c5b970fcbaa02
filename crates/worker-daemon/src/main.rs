//! Local optimization harness
//!
//! Seeds a small fleet against in-memory backends, generates sequences,
//! drives the worker runtime off the bus until every queue is terminal, then
//! runs the coordinator and prints the winning assignments. Production
//! deployments swap the in-memory repository, checkpoint store, and bus for
//! their Postgres, Redis, and broker implementations behind the same traits.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{Duration, NaiveDate, Utc};
use log::{info, warn};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use assigner::QueueJob;
use checkpoint_store::InMemoryCheckpointStore;
use message_bus::{queues, InMemoryMessageBus, MessageBus, WorkMessage, WorkOrder};
use queue_store::{
    InMemoryQueueRepository, OptimizationInstanceRow, OptimizationQueueRow, QueueRepository,
};
use rate_model::{
    device_cost, BillingContext, ChargeType, Device, DeviceResult, PlanType, PortalType,
    QueueResult, RatePlan, RatePlanId, RatePoolCollection,
};
use sequence_gen::{GenerationOutcome, GeneratorConfig, SequenceGenerator};
use worker_runtime::{
    Coordinator, CoordinatorConfig, InMemoryWorkloadLoader, LogProgressSink, WorkerConfig,
    WorkerRuntime,
};

const SESSION_ID: i64 = 1;
const INSTANCE_ID: i64 = 1;
const COMM_GROUP_ID: i64 = 1;
const SERVICE_PROVIDER_ID: i64 = 10;

fn plan_catalog() -> BTreeMap<RatePlanId, RatePlan> {
    let plans = vec![
        RatePlan {
            rate_plan_id: 100,
            plan_type: PlanType::Iot,
            included_allowance: dec!(250),
            base_rate: dec!(4),
            overage_rate: dec!(6),
            overage_block_size: dec!(50),
            is_shared_pool: false,
        },
        RatePlan {
            rate_plan_id: 200,
            plan_type: PlanType::Data,
            included_allowance: dec!(1000),
            base_rate: dec!(11),
            overage_rate: dec!(5),
            overage_block_size: dec!(100),
            is_shared_pool: false,
        },
        RatePlan {
            rate_plan_id: 300,
            plan_type: PlanType::Data,
            included_allowance: dec!(5000),
            base_rate: dec!(28),
            overage_rate: dec!(4),
            overage_block_size: dec!(250),
            is_shared_pool: true,
        },
    ];
    plans.into_iter().map(|p| (p.rate_plan_id, p)).collect()
}

fn fleet() -> Vec<Device> {
    let activation = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
    let usages: [(i64, Decimal); 8] = [
        (1, dec!(120)),
        (2, dec!(80)),
        (3, dec!(950)),
        (4, dec!(1400)),
        (5, dec!(30)),
        (6, dec!(2600)),
        (7, dec!(610)),
        (8, dec!(450)),
    ];
    usages
        .into_iter()
        .map(|(device_id, usage)| Device {
            device_id,
            comm_plan_id: 1 + device_id % 2,
            current_rate_plan_id: 200,
            usage_for_period: usage,
            activation_date: activation,
            billing_days_active: 30,
            is_prorated: false,
        })
        .collect()
}

fn baseline_for(
    devices: &[Device],
    catalog: &BTreeMap<RatePlanId, RatePlan>,
    billing: &BillingContext,
) -> Option<QueueResult> {
    let mut rows = Vec::with_capacity(devices.len());
    for d in devices {
        let plan = catalog.get(&d.current_rate_plan_id)?;
        let pool = rate_model::RatePool::from_plan(plan).ok()?;
        let cost = device_cost(&pool, d, billing).ok()?;
        rows.push(DeviceResult {
            device_id: d.device_id,
            assigned_rate_plan_id: plan.rate_plan_id,
            base_cost: cost.base_cost,
            overage_cost: cost.overage_cost,
            total_cost: cost.total(),
        });
    }
    Some(QueueResult::from_rows(0, rows))
}

#[tokio::main]
async fn main() {
    utils::init_logger();

    let catalog = plan_catalog();
    let devices = fleet();
    let billing = BillingContext::new(30, true).expect("billing period");

    let candidate_ids: Vec<RatePlanId> = catalog.keys().copied().collect();
    let pools = RatePoolCollection::from_plans(&candidate_ids, &catalog)
        .expect("demo catalog has only eligible plans");
    let baseline = baseline_for(&devices, &catalog, &billing);
    let baseline_cost = baseline.as_ref().map(|b| b.total_cost);
    info!(
        "fleet of {} devices, baseline cost {}",
        devices.len(),
        baseline_cost.unwrap_or_default()
    );

    // sequences seed the parallel assignment attempts, one queue each
    let generator = SequenceGenerator::new(GeneratorConfig {
        max_sequences: 4,
        random_permutations: 8,
        rng_seed: Some(2024),
        ..GeneratorConfig::default()
    });
    let sequences = match generator
        .generate(&pools, &devices, &billing, baseline_cost)
        .expect("sequence generation")
    {
        GenerationOutcome::Inline(sequences) => sequences,
        GenerationOutcome::Distributed(plan) => {
            warn!(
                "candidate space of {} permutations needs distributed generation; not part of this harness",
                plan.total_permutations
            );
            return;
        }
    };
    info!("generated {} sequence(s)", sequences.len());

    let repo = Arc::new(InMemoryQueueRepository::new());
    let checkpoints = Arc::new(InMemoryCheckpointStore::new());
    let bus = Arc::new(InMemoryMessageBus::default());
    let loader = Arc::new(InMemoryWorkloadLoader::new());

    repo.seed_instance(OptimizationInstanceRow {
        id: INSTANCE_ID,
        session_id: SESSION_ID,
        service_provider_id: SERVICE_PROVIDER_ID,
        portal_type: PortalType::M2M,
        is_customer_optimization: false,
        billing_period_start: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
        billing_period_end: NaiveDate::from_ymd_opt(2024, 1, 30).unwrap(),
    });

    for (i, sequence) in sequences.iter().enumerate() {
        let queue_id = (i + 1) as i64;
        repo.seed_queue(
            OptimizationQueueRow::seeded(queue_id, INSTANCE_ID, COMM_GROUP_ID, SERVICE_PROVIDER_ID),
            sequence.rate_plan_ids.clone(),
        );
        let queue_pools = RatePoolCollection::from_plans(&sequence.rate_plan_ids, &catalog)
            .expect("sequence plans come from the catalog");
        loader.insert(QueueJob {
            queue_id,
            pools: queue_pools,
            devices: devices.clone(),
            portal_type: PortalType::M2M,
            charge_type: ChargeType::BaseAndOverage,
            billing,
            baseline: baseline.clone().map(|mut b| {
                b.queue_id = queue_id;
                b
            }),
        });

        let order = WorkOrder {
            queue_ids: vec![queue_id],
            is_continuation: false,
            skip_lower_cost_check: false,
            charge_type: ChargeType::BaseAndOverage,
            session_id: SESSION_ID,
            continuation_attempt: 0,
        };
        bus.send(
            queues::OPTIMIZATION_WORK,
            WorkMessage::new("{}", order.to_attributes()),
        )
        .await
        .expect("in-memory send");
    }

    let runtime = WorkerRuntime::new(
        Arc::clone(&repo),
        Arc::clone(&checkpoints),
        Arc::clone(&bus),
        Arc::clone(&loader) as Arc<dyn worker_runtime::WorkloadLoader>,
        Arc::new(LogProgressSink),
        WorkerConfig::default(),
    );

    // consume until the work queue drains; continuations re-enter the loop
    loop {
        let batch = bus
            .receive(queues::OPTIMIZATION_WORK, 5, chrono::Duration::minutes(16))
            .await
            .expect("in-memory receive");
        if batch.is_empty() {
            break;
        }
        for message in batch {
            match runtime
                .handle_message(&message, Duration::minutes(15))
                .await
            {
                Ok(disposition) => {
                    info!("message {} -> {:?}", message.message_id, disposition);
                    bus.delete(queues::OPTIMIZATION_WORK, message.message_id)
                        .await
                        .expect("in-memory delete");
                }
                Err(e) => warn!("message {} failed: {}", message.message_id, e),
            }
        }
    }

    let coordinator = Coordinator::new(
        Arc::clone(&repo),
        Arc::clone(&bus),
        Arc::new(LogProgressSink),
        CoordinatorConfig {
            poll_backoff_secs: vec![1],
            max_poll_attempts: 3,
            ..CoordinatorConfig::default()
        },
    );
    let outcome = coordinator
        .run_session(SESSION_ID)
        .await
        .expect("coordination");
    info!("coordination finished at {}: {:?}", Utc::now(), outcome);

    if let Ok(winners) = repo.winning_queues(SESSION_ID).await {
        for winner in winners {
            info!(
                "comm group {}: queue {} wins at {}",
                winner.comm_group_id, winner.queue_id, winner.total_cost
            );
            if let Ok(rows) = repo.device_results(winner.queue_id).await {
                for row in rows {
                    info!(
                        "  device {} -> plan {} (base {}, overage {}, total {})",
                        row.device_id,
                        row.assigned_rate_plan_id,
                        row.base_cost,
                        row.overage_cost,
                        row.total_cost
                    );
                }
            }
        }
    }
}
