//! Core models for rate-plan optimization

use std::collections::BTreeMap;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::ModelError;

pub type RatePlanId = i64;
pub type CommPlanId = i64;
pub type CommGroupId = i64;
pub type DeviceId = i64;
pub type QueueId = i64;
pub type InstanceId = i64;
pub type SessionId = i64;
pub type ServiceProviderId = i64;

/// Hard ceiling on candidate rate plans per communication group. Groups above
/// this fail fast before any sequence is generated.
pub const MAX_RATE_PLANS_PER_GROUP: usize = 15;

/// Carrier rate-plan category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlanType {
    Data,
    Voice,
    Sms,
    Bundle,
    Iot,
    Unlimited,
    Prepaid,
}

/// Portal a session optimizes for; Mobility restricts the assigner strategy set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PortalType {
    #[serde(rename = "M2M")]
    M2M,
    Mobility,
    CrossProvider,
}

/// Which cost terms feed the optimization objective. All terms are still
/// computed for reporting; only the objective value changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChargeType {
    BaseAndOverage,
    OverageOnly,
    BaseOnly,
}

impl ChargeType {
    /// Wire encoding used in work-message attributes
    pub fn code(&self) -> i32 {
        match self {
            ChargeType::BaseAndOverage => 0,
            ChargeType::OverageOnly => 1,
            ChargeType::BaseOnly => 2,
        }
    }

    pub fn from_code(code: i32) -> Result<Self, ModelError> {
        match code {
            0 => Ok(ChargeType::BaseAndOverage),
            1 => Ok(ChargeType::OverageOnly),
            2 => Ok(ChargeType::BaseOnly),
            other => Err(ModelError::InvalidChargeType(other)),
        }
    }
}

impl Default for ChargeType {
    fn default() -> Self {
        ChargeType::BaseAndOverage
    }
}

/// Carrier-offered tariff
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RatePlan {
    /// Globally unique plan id
    pub rate_plan_id: RatePlanId,
    pub plan_type: PlanType,
    /// Included allowance per billing period, unprorated (nominally MB for data)
    pub included_allowance: Decimal,
    /// Monetary base charge per billing period, unprorated
    pub base_rate: Decimal,
    /// Monetary charge per overage block; must be > 0 for eligibility
    pub overage_rate: Decimal,
    /// Overage billing granularity in allowance units; must be > 0
    pub overage_block_size: Decimal,
    /// When true, devices on this plan share one allowance pool
    pub is_shared_pool: bool,
}

impl RatePlan {
    /// A plan is eligible for optimization only when overage can be priced.
    pub fn is_eligible(&self) -> bool {
        self.overage_rate > Decimal::ZERO && self.overage_block_size > Decimal::ZERO
    }

    /// Overage price per allowance unit; used to rank sequences.
    pub fn cost_per_unit(&self) -> Decimal {
        self.overage_rate / self.overage_block_size
    }
}

/// A group of devices sharing the same set of candidate rate plans
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommunicationPlan {
    pub comm_plan_id: CommPlanId,
    /// Ordered set of candidate plan ids
    pub candidate_rate_plan_ids: Vec<RatePlanId>,
}

/// Comm plans with identical candidate plan sets merged into one group.
/// Created fresh per optimization run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommunicationGroup {
    pub comm_group_id: CommGroupId,
    pub comm_plan_ids: Vec<CommPlanId>,
    /// Candidate plans in the order declared by the member comm plans
    pub candidate_rate_plan_ids: Vec<RatePlanId>,
}

impl CommunicationGroup {
    /// Merge comm plans into groups by identical candidate plan set.
    /// Group ids are assigned sequentially from `first_id` in a deterministic
    /// order (sorted candidate lists).
    pub fn from_comm_plans(plans: &[CommunicationPlan], first_id: CommGroupId) -> Vec<Self> {
        let mut by_candidates: BTreeMap<Vec<RatePlanId>, (Vec<CommPlanId>, Vec<RatePlanId>)> =
            BTreeMap::new();

        for plan in plans {
            let mut key = plan.candidate_rate_plan_ids.clone();
            key.sort_unstable();
            key.dedup();
            by_candidates
                .entry(key)
                .or_insert_with(|| (Vec::new(), plan.candidate_rate_plan_ids.clone()))
                .0
                .push(plan.comm_plan_id);
        }

        by_candidates
            .into_values()
            .enumerate()
            .map(|(i, (mut comm_plan_ids, candidates))| {
                comm_plan_ids.sort_unstable();
                CommunicationGroup {
                    comm_group_id: first_id + i as CommGroupId,
                    comm_plan_ids,
                    candidate_rate_plan_ids: candidates,
                }
            })
            .collect()
    }

    /// Fail fast when the group exceeds the candidate-plan ceiling.
    pub fn validate(&self) -> Result<(), ModelError> {
        if self.candidate_rate_plan_ids.len() > MAX_RATE_PLANS_PER_GROUP {
            return Err(ModelError::TooManyRatePlans {
                comm_group_id: self.comm_group_id,
                count: self.candidate_rate_plan_ids.len(),
                max: MAX_RATE_PLANS_PER_GROUP,
            });
        }
        Ok(())
    }
}

/// Immutable SIM-card usage snapshot taken at sync time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Device {
    pub device_id: DeviceId,
    pub comm_plan_id: CommPlanId,
    pub current_rate_plan_id: RatePlanId,
    /// Usage for the billing period in the plan's allowance units
    pub usage_for_period: Decimal,
    pub activation_date: NaiveDate,
    /// Days active within the billing period; never exceeds the period length
    pub billing_days_active: u32,
    pub is_prorated: bool,
}

impl Device {
    pub fn validate(&self, period_days: u32) -> Result<(), ModelError> {
        if self.usage_for_period < Decimal::ZERO {
            return Err(ModelError::NegativeUsage {
                device_id: self.device_id,
            });
        }
        if self.billing_days_active > period_days {
            return Err(ModelError::ActiveDaysExceedPeriod {
                device_id: self.device_id,
                days_active: self.billing_days_active,
                period_days,
            });
        }
        Ok(())
    }
}

/// A rate plan enriched with the effective figures the assigner prices against
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RatePool {
    pub rate_plan_id: RatePlanId,
    pub plan_type: PlanType,
    pub pool_allowance: Decimal,
    pub pool_base_cost: Decimal,
    pub pool_overage_rate: Decimal,
    pub overage_block_size: Decimal,
    /// Shared pools aggregate member usage before overage is computed once
    pub is_shared: bool,
}

impl RatePool {
    /// Build a pool from an eligible plan; ineligible plans fail the group.
    pub fn from_plan(plan: &RatePlan) -> Result<Self, ModelError> {
        if !plan.is_eligible() {
            return Err(ModelError::IneligibleRatePlan(plan.rate_plan_id));
        }
        Ok(RatePool {
            rate_plan_id: plan.rate_plan_id,
            plan_type: plan.plan_type,
            pool_allowance: plan.included_allowance,
            pool_base_cost: plan.base_rate,
            pool_overage_rate: plan.overage_rate,
            overage_block_size: plan.overage_block_size,
            is_shared: plan.is_shared_pool,
        })
    }

    pub fn cost_per_unit(&self) -> Decimal {
        self.pool_overage_rate / self.overage_block_size
    }
}

/// Ordered candidate pools for one communication group. The order is the
/// sequence the assigner walks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RatePoolCollection {
    pools: Vec<RatePool>,
}

impl RatePoolCollection {
    pub fn new(pools: Vec<RatePool>) -> Self {
        Self { pools }
    }

    /// Build pools for the group's candidate plans, in sequence order.
    pub fn from_plans(
        plan_ids: &[RatePlanId],
        catalog: &BTreeMap<RatePlanId, RatePlan>,
    ) -> Result<Self, ModelError> {
        let mut pools = Vec::with_capacity(plan_ids.len());
        for id in plan_ids {
            let plan = catalog.get(id).ok_or(ModelError::UnknownRatePlan(*id))?;
            pools.push(RatePool::from_plan(plan)?);
        }
        Ok(Self { pools })
    }

    pub fn len(&self) -> usize {
        self.pools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pools.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&RatePool> {
        self.pools.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &RatePool> {
        self.pools.iter()
    }

    pub fn plan_ids(&self) -> Vec<RatePlanId> {
        self.pools.iter().map(|p| p.rate_plan_id).collect()
    }
}

/// An ordered list of rate-plan ids fed to the assigner as its search prior
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RatePlanSequence {
    /// Bound once the orchestrator creates the owning queue
    pub queue_id: Option<QueueId>,
    pub rate_plan_ids: Vec<RatePlanId>,
    /// Cheap estimate used to rank candidate sequences; not a real cost
    pub cost_hint: Option<Decimal>,
}

impl RatePlanSequence {
    pub fn new(rate_plan_ids: Vec<RatePlanId>) -> Self {
        Self {
            queue_id: None,
            rate_plan_ids,
            cost_hint: None,
        }
    }
}

/// Per-device outcome row of a winning assignment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceResult {
    pub device_id: DeviceId,
    pub assigned_rate_plan_id: RatePlanId,
    pub base_cost: Decimal,
    pub overage_cost: Decimal,
    pub total_cost: Decimal,
}

/// Complete result for one queue: per-device rows plus aggregates
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueResult {
    pub queue_id: QueueId,
    pub device_results: Vec<DeviceResult>,
    pub total_base_cost: Decimal,
    pub total_overage_cost: Decimal,
    pub total_cost: Decimal,
}

impl QueueResult {
    /// Assemble a result from rows, deriving the aggregates. Rows are sorted
    /// by device id so identical assignments serialize identically.
    pub fn from_rows(queue_id: QueueId, mut rows: Vec<DeviceResult>) -> Self {
        rows.sort_by_key(|r| r.device_id);
        let total_base_cost: Decimal = rows.iter().map(|r| r.base_cost).sum();
        let total_overage_cost: Decimal = rows.iter().map(|r| r.overage_cost).sum();
        let total_cost: Decimal = rows.iter().map(|r| r.total_cost).sum();
        QueueResult {
            queue_id,
            device_results: rows,
            total_base_cost,
            total_overage_cost,
            total_cost,
        }
    }

    /// Aggregate value of this result under the given objective.
    pub fn objective_cost(&self, charge_type: ChargeType) -> Decimal {
        match charge_type {
            ChargeType::BaseAndOverage => self.total_cost,
            ChargeType::OverageOnly => self.total_overage_cost,
            ChargeType::BaseOnly => self.total_base_cost,
        }
    }
}
