//! The greedy assignment engine
//!
//! For each queue job the engine evaluates every applicable strategy on the
//! job's sequence: devices are visited in strategy order and each is placed
//! into the pool with the lowest marginal objective cost, scanning the whole
//! remaining sequence. Ties break on lowest post-placement overage, then
//! lowest pool index, so results are fully deterministic.
//!
//! The engine suspends only between device placements: the deadline and the
//! cancellation flag are checked before every step and never mid-placement.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{debug, warn};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use rate_model::{
    attribute_shared_cost, device_cost, effective_allowance, overage_cost, shared_pool_cost,
    BillingContext, ChargeType, CostBreakdown, Device, DeviceResult, PortalType, QueueId,
    QueueResult, RatePoolCollection, MAX_RATE_PLANS_PER_GROUP,
};

use crate::strategy::Strategy;

/// One queue's worth of work: a sequence bound to a device population
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueJob {
    pub queue_id: QueueId,
    /// Candidate pools in sequence order; the assigner's search prior
    pub pools: RatePoolCollection,
    pub devices: Vec<Device>,
    pub portal_type: PortalType,
    pub charge_type: ChargeType,
    pub billing: BillingContext,
    /// Cost of the current assignment, used as the lower-cost gate
    pub baseline: Option<QueueResult>,
}

/// Message-level options applying to every job in the batch
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct AssignerOptions {
    /// Record the best strategy result even when it is worse than baseline
    pub skip_lower_cost_check: bool,
}

/// Externally triggered cancellation, honored at the next placement boundary
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Per-run execution context; never serialized, rebound on every resume
#[derive(Debug, Clone)]
pub struct RunContext {
    pub soft_deadline: DateTime<Utc>,
    pub cancel: CancelFlag,
}

impl RunContext {
    pub fn with_deadline(soft_deadline: DateTime<Utc>) -> Self {
        Self {
            soft_deadline,
            cancel: CancelFlag::new(),
        }
    }
}

/// How a run call returned control
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Completed,
    Suspended(SuspendReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuspendReason {
    DeadlineExpired,
    Cancelled,
}

/// Terminal outcome for one queue in the batch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum QueueOutcome {
    Success {
        result: QueueResult,
        /// Winning strategy; `None` when the baseline assignment was kept
        strategy: Option<Strategy>,
        objective_cost: Decimal,
    },
    Failed {
        reason: String,
    },
}

/// Best fully evaluated strategy so far for the current job
#[derive(Debug, Clone, Serialize, Deserialize)]
struct BestStrategy {
    strategy: Strategy,
    objective_cost: Decimal,
    /// Pool index per device index
    assignment: Vec<usize>,
}

/// Mutable placement state for the strategy currently being evaluated
#[derive(Debug, Clone, Serialize, Deserialize)]
struct JobProgress {
    strategy_pos: usize,
    device_pos: usize,
    /// Device visit order for the current strategy
    order: Vec<usize>,
    /// Pool index per device index for the current strategy
    assignment: Vec<Option<usize>>,
    /// Per-pool aggregate usage (shared pools)
    pool_usage: Vec<Decimal>,
    /// Per-pool aggregate effective allowance (shared pools)
    pool_allowance: Vec<Decimal>,
    /// Per-pool member counts, in placement order
    pool_members: Vec<Vec<usize>>,
    /// Per-pool running base / overage sums (unshared pools)
    pool_base: Vec<Decimal>,
    pool_overage: Vec<Decimal>,
    /// Set when a device cost failure aborted the current strategy
    strategy_failed: Option<String>,
    failures: Vec<String>,
    best: Option<BestStrategy>,
}

impl JobProgress {
    fn start(job: &QueueJob, strategy_pos: usize, best: Option<BestStrategy>, failures: Vec<String>) -> Self {
        let strategies = Strategy::for_portal(job.portal_type);
        let order = strategies[strategy_pos].visit_order(&job.devices);
        let pool_count = job.pools.len();
        Self {
            strategy_pos,
            device_pos: 0,
            order,
            assignment: vec![None; job.devices.len()],
            pool_usage: vec![Decimal::ZERO; pool_count],
            pool_allowance: vec![Decimal::ZERO; pool_count],
            pool_members: vec![Vec::new(); pool_count],
            pool_base: vec![Decimal::ZERO; pool_count],
            pool_overage: vec![Decimal::ZERO; pool_count],
            strategy_failed: None,
            failures,
            best,
        }
    }
}

/// The suspendable optimizer over a batch of queue jobs.
///
/// Serializable in its entirety: a deserialized engine resumes at the exact
/// cursor with identical tie-break outcomes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchAssigner {
    jobs: Vec<QueueJob>,
    options: AssignerOptions,
    job_index: usize,
    progress: Option<JobProgress>,
    outcomes: BTreeMap<QueueId, QueueOutcome>,
    completed: bool,
}

impl BatchAssigner {
    pub fn new(jobs: Vec<QueueJob>, options: AssignerOptions) -> Self {
        Self {
            jobs,
            options,
            job_index: 0,
            progress: None,
            outcomes: BTreeMap::new(),
            completed: false,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    /// Outcomes for every finished queue, keyed by queue id.
    pub fn outcomes(&self) -> &BTreeMap<QueueId, QueueOutcome> {
        &self.outcomes
    }

    /// Queue ids not yet finished; always a subset of the batch.
    pub fn unfinished_queue_ids(&self) -> Vec<QueueId> {
        let mut ids: Vec<QueueId> = self.jobs[self.job_index.min(self.jobs.len())..]
            .iter()
            .map(|j| j.queue_id)
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Coarse progress for continuation diagnostics.
    pub fn progress_percent(&self) -> f64 {
        if self.jobs.is_empty() || self.completed {
            return 100.0;
        }
        let intra = match &self.progress {
            Some(p) => {
                let strategies =
                    Strategy::for_portal(self.jobs[self.job_index].portal_type).len() as f64;
                let devices = p.order.len().max(1) as f64;
                (p.strategy_pos as f64 + p.device_pos as f64 / devices) / strategies
            }
            None => 0.0,
        };
        (self.job_index as f64 + intra) / self.jobs.len() as f64 * 100.0
    }

    /// First pass over the batch.
    pub fn run(&mut self, ctx: &RunContext) -> RunStatus {
        self.drive(ctx)
    }

    /// Continue a deserialized engine from its cursor.
    pub fn resume(&mut self, ctx: &RunContext) -> RunStatus {
        self.drive(ctx)
    }

    fn drive(&mut self, ctx: &RunContext) -> RunStatus {
        loop {
            if self.job_index >= self.jobs.len() {
                self.completed = true;
                return RunStatus::Completed;
            }

            // suspension points: only between placements
            if ctx.cancel.is_cancelled() {
                return RunStatus::Suspended(SuspendReason::Cancelled);
            }
            if Utc::now() >= ctx.soft_deadline {
                return RunStatus::Suspended(SuspendReason::DeadlineExpired);
            }

            self.step();
        }
    }

    /// Force-finalize after the continuation budget is exhausted: the current
    /// job keeps its best fully evaluated strategy if one exists, everything
    /// else fails with the given reason.
    pub fn force_complete(&mut self, reason: &str) {
        while self.job_index < self.jobs.len() {
            let job = &self.jobs[self.job_index];
            let outcome = match self.progress.take().and_then(|p| p.best) {
                Some(best) => self.outcome_from_best(self.job_index, best),
                None => QueueOutcome::Failed {
                    reason: reason.to_string(),
                },
            };
            self.outcomes.insert(job.queue_id, outcome);
            self.job_index += 1;
        }
        self.completed = true;
    }

    /// One atomic unit of work: a single device placement or a boundary
    /// transition (strategy or job roll-over).
    fn step(&mut self) {
        let job_index = self.job_index;
        let job = &self.jobs[job_index];
        let strategies = Strategy::for_portal(job.portal_type);

        if self.progress.is_none() {
            if let Some(reason) = validate_job(job) {
                self.finish_job(QueueOutcome::Failed { reason });
                return;
            }
            self.progress = Some(JobProgress::start(job, 0, None, Vec::new()));
            return;
        }

        let progress = self.progress.as_mut().expect("progress initialized above");

        // strategy aborted by a device cost failure: move on
        if let Some(reason) = progress.strategy_failed.take() {
            let strategy = strategies[progress.strategy_pos];
            warn!(
                "queue {}: strategy {:?} aborted: {}",
                job.queue_id, strategy, reason
            );
            progress.failures.push(format!("{:?}: {}", strategy, reason));
            self.advance_strategy();
            return;
        }

        // strategy fully evaluated: score it
        if progress.device_pos >= progress.order.len() {
            let strategy = strategies[progress.strategy_pos];
            let total = strategy_objective_total(job, progress);
            debug!(
                "queue {}: strategy {:?} total objective cost {}",
                job.queue_id, strategy, total
            );
            let better = match &progress.best {
                Some(best) => total < best.objective_cost,
                None => true,
            };
            if better {
                progress.best = Some(BestStrategy {
                    strategy,
                    objective_cost: total,
                    assignment: progress
                        .assignment
                        .iter()
                        .map(|p| p.expect("complete strategy has every device placed"))
                        .collect(),
                });
            }
            self.advance_strategy();
            return;
        }

        // place one device
        let device_index = progress.order[progress.device_pos];
        match place_device(job, progress, device_index) {
            Ok(()) => progress.device_pos += 1,
            Err(reason) => progress.strategy_failed = Some(reason),
        }
    }

    /// Move to the next strategy, or finalize the job after the last one.
    fn advance_strategy(&mut self) {
        let job_index = self.job_index;
        let job = &self.jobs[job_index];
        let strategies = Strategy::for_portal(job.portal_type);
        let progress = self.progress.take().expect("advancing requires progress");
        let next = progress.strategy_pos + 1;

        if next < strategies.len() {
            self.progress = Some(JobProgress::start(job, next, progress.best, progress.failures));
            return;
        }

        let outcome = match progress.best {
            Some(best) => self.outcome_from_best(job_index, best),
            None => QueueOutcome::Failed {
                reason: format!(
                    "all strategies failed: [{}]",
                    progress.failures.join("; ")
                ),
            },
        };
        self.finish_job(outcome);
    }

    fn finish_job(&mut self, outcome: QueueOutcome) {
        let queue_id = self.jobs[self.job_index].queue_id;
        self.outcomes.insert(queue_id, outcome);
        self.progress = None;
        self.job_index += 1;
    }

    /// Build the queue outcome from the winning strategy, applying the
    /// lower-cost-than-baseline gate unless the message disabled it.
    fn outcome_from_best(&self, job_index: usize, best: BestStrategy) -> QueueOutcome {
        let job = &self.jobs[job_index];

        if !self.options.skip_lower_cost_check {
            if let Some(baseline) = &job.baseline {
                let baseline_objective = baseline.objective_cost(job.charge_type);
                if best.objective_cost > baseline_objective {
                    debug!(
                        "queue {}: best strategy cost {} is not below baseline {}, keeping current assignment",
                        job.queue_id, best.objective_cost, baseline_objective
                    );
                    let mut result = baseline.clone();
                    result.queue_id = job.queue_id;
                    return QueueOutcome::Success {
                        objective_cost: baseline_objective,
                        strategy: None,
                        result,
                    };
                }
            }
        }

        match build_result(job, &best) {
            Ok(result) => QueueOutcome::Success {
                objective_cost: best.objective_cost,
                strategy: Some(best.strategy),
                result,
            },
            Err(reason) => QueueOutcome::Failed { reason },
        }
    }

    #[cfg(test)]
    pub(crate) fn step_n(&mut self, steps: usize) {
        for _ in 0..steps {
            if self.job_index >= self.jobs.len() {
                self.completed = true;
                return;
            }
            self.step();
        }
    }
}

fn validate_job(job: &QueueJob) -> Option<String> {
    if job.pools.is_empty() {
        return Some("sequence has no rate pools".to_string());
    }
    if job.pools.len() > MAX_RATE_PLANS_PER_GROUP {
        return Some(format!(
            "sequence has {} rate pools (max {})",
            job.pools.len(),
            MAX_RATE_PLANS_PER_GROUP
        ));
    }
    if job.devices.is_empty() {
        return Some("communication group has no devices".to_string());
    }
    None
}

/// Greedy placement: scan the remaining sequence, take the pool with the
/// lowest marginal objective cost; ties break on post-placement overage,
/// then pool index.
fn place_device(
    job: &QueueJob,
    progress: &mut JobProgress,
    device_index: usize,
) -> Result<(), String> {
    let device = &job.devices[device_index];
    let mut chosen: Option<(Decimal, Decimal, usize)> = None;

    for (pool_index, pool) in job.pools.iter().enumerate() {
        let (marginal, post_overage) = if pool.is_shared {
            let before = if progress.pool_members[pool_index].is_empty() {
                Decimal::ZERO
            } else {
                CostBreakdown {
                    base_cost: pool.pool_base_cost,
                    overage_cost: overage_cost(
                        pool,
                        progress.pool_usage[pool_index],
                        progress.pool_allowance[pool_index],
                    ),
                }
                .objective(job.charge_type)
            };
            let after_overage = overage_cost(
                pool,
                progress.pool_usage[pool_index] + device.usage_for_period,
                progress.pool_allowance[pool_index] + effective_allowance(pool, device, &job.billing),
            );
            let after = CostBreakdown {
                base_cost: pool.pool_base_cost,
                overage_cost: after_overage,
            }
            .objective(job.charge_type);
            (after - before, after_overage)
        } else {
            let cost = device_cost(pool, device, &job.billing)
                .map_err(|e| format!("device {}: {}", device.device_id, e))?;
            (cost.objective(job.charge_type), cost.overage_cost)
        };

        let candidate = (marginal, post_overage, pool_index);
        chosen = match chosen {
            Some(current) if current <= candidate => Some(current),
            _ => Some(candidate),
        };
    }

    let (_, _, pool_index) = chosen.expect("job validation guarantees at least one pool");
    let pool = job.pools.get(pool_index).expect("index from enumeration");
    if pool.is_shared {
        progress.pool_usage[pool_index] += device.usage_for_period;
        progress.pool_allowance[pool_index] += effective_allowance(pool, device, &job.billing);
    } else {
        let cost = device_cost(pool, device, &job.billing)
            .map_err(|e| format!("device {}: {}", device.device_id, e))?;
        progress.pool_base[pool_index] += cost.base_cost;
        progress.pool_overage[pool_index] += cost.overage_cost;
    }
    progress.pool_members[pool_index].push(device_index);
    progress.assignment[device_index] = Some(pool_index);
    Ok(())
}

/// Total objective cost of a fully placed strategy.
fn strategy_objective_total(job: &QueueJob, progress: &JobProgress) -> Decimal {
    let mut total = Decimal::ZERO;
    for (pool_index, pool) in job.pools.iter().enumerate() {
        if progress.pool_members[pool_index].is_empty() {
            continue;
        }
        let breakdown = if pool.is_shared {
            CostBreakdown {
                base_cost: pool.pool_base_cost,
                overage_cost: overage_cost(
                    pool,
                    progress.pool_usage[pool_index],
                    progress.pool_allowance[pool_index],
                ),
            }
        } else {
            CostBreakdown {
                base_cost: progress.pool_base[pool_index],
                overage_cost: progress.pool_overage[pool_index],
            }
        };
        total += breakdown.objective(job.charge_type);
    }
    total
}

/// Materialize the per-device result rows for a winning assignment. Members
/// are rebuilt in the strategy's visit order so shared-pool attribution is
/// reproducible.
fn build_result(job: &QueueJob, best: &BestStrategy) -> Result<QueueResult, String> {
    let order = best.strategy.visit_order(&job.devices);
    let mut pool_members: Vec<Vec<usize>> = vec![Vec::new(); job.pools.len()];
    for &device_index in &order {
        let pool_index = best.assignment[device_index];
        pool_members[pool_index].push(device_index);
    }

    let mut rows: Vec<DeviceResult> = Vec::with_capacity(job.devices.len());
    for (pool_index, members) in pool_members.iter().enumerate() {
        if members.is_empty() {
            continue;
        }
        let pool = job.pools.get(pool_index).expect("assignment indexes pools");
        if pool.is_shared {
            let member_devices: Vec<&Device> =
                members.iter().map(|&i| &job.devices[i]).collect();
            let cost = shared_pool_cost(pool, &member_devices, &job.billing)
                .map_err(|e| e.to_string())?;
            rows.extend(attribute_shared_cost(pool, &member_devices, &cost));
        } else {
            for &i in members {
                let device = &job.devices[i];
                let cost =
                    device_cost(pool, device, &job.billing).map_err(|e| e.to_string())?;
                rows.push(DeviceResult {
                    device_id: device.device_id,
                    assigned_rate_plan_id: pool.rate_plan_id,
                    base_cost: cost.base_cost,
                    overage_cost: cost.overage_cost,
                    total_cost: cost.total(),
                });
            }
        }
    }

    Ok(QueueResult::from_rows(job.queue_id, rows))
}
