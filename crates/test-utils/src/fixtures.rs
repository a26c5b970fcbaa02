//! Builders for plans, pools, and device snapshots used across crate tests

use chrono::NaiveDate;
use rust_decimal::Decimal;

use rate_model::{
    BillingContext, Device, PlanType, RatePlan, RatePool, RatePoolCollection,
};

/// A data plan with the given pricing terms, unshared.
pub fn data_plan(
    id: i64,
    base_rate: Decimal,
    allowance: Decimal,
    overage_rate: Decimal,
    block_size: Decimal,
) -> RatePlan {
    RatePlan {
        rate_plan_id: id,
        plan_type: PlanType::Data,
        included_allowance: allowance,
        base_rate,
        overage_rate,
        overage_block_size: block_size,
        is_shared_pool: false,
    }
}

/// Same terms as [`data_plan`] but with a shared allowance pool.
pub fn shared_data_plan(
    id: i64,
    base_rate: Decimal,
    allowance: Decimal,
    overage_rate: Decimal,
    block_size: Decimal,
) -> RatePlan {
    RatePlan {
        is_shared_pool: true,
        ..data_plan(id, base_rate, allowance, overage_rate, block_size)
    }
}

/// Full-period device snapshot, not prorated.
pub fn device(id: i64, comm_plan_id: i64, current_rate_plan_id: i64, usage: Decimal) -> Device {
    Device {
        device_id: id,
        comm_plan_id,
        current_rate_plan_id,
        usage_for_period: usage,
        activation_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
        billing_days_active: 30,
        is_prorated: false,
    }
}

/// Device active only part of the period with proration enabled.
pub fn prorated_device(
    id: i64,
    comm_plan_id: i64,
    current_rate_plan_id: i64,
    usage: Decimal,
    days_active: u32,
) -> Device {
    Device {
        billing_days_active: days_active,
        is_prorated: true,
        ..device(id, comm_plan_id, current_rate_plan_id, usage)
    }
}

/// Billing context with proration enabled; full-period devices are unaffected.
pub fn billing(period_days: u32) -> BillingContext {
    BillingContext::new(period_days, true).expect("non-empty billing period")
}

/// Build a pool collection directly from plan terms, bypassing eligibility
/// validation so tests can exercise the ineligible-plan paths.
pub fn pool_collection(plans: &[RatePlan]) -> RatePoolCollection {
    RatePoolCollection::new(
        plans
            .iter()
            .map(|plan| RatePool {
                rate_plan_id: plan.rate_plan_id,
                plan_type: plan.plan_type,
                pool_allowance: plan.included_allowance,
                pool_base_cost: plan.base_rate,
                pool_overage_rate: plan.overage_rate,
                overage_block_size: plan.overage_block_size,
                is_shared: plan.is_shared_pool,
            })
            .collect(),
    )
}
