//! Billing-period cost calculator
//!
//! Pure functions of (pool, device usage, billing context). Unshared pools
//! price each device independently; shared pools charge the base once and
//! compute overage from aggregate usage against the summed member allowances.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::ModelError;
use crate::models::{ChargeType, Device, DeviceResult, RatePool};

/// Billing context the calculator prices against
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BillingContext {
    /// Length of the billing period in days
    pub billing_period_days: u32,
    /// Queue-level proration switch; a device is prorated only when both this
    /// and its own `is_prorated` flag are set
    pub uses_proration: bool,
}

impl BillingContext {
    pub fn new(billing_period_days: u32, uses_proration: bool) -> Result<Self, ModelError> {
        if billing_period_days == 0 {
            return Err(ModelError::EmptyBillingPeriod);
        }
        Ok(Self {
            billing_period_days,
            uses_proration,
        })
    }

    /// Fraction of the period the device is billed for.
    pub fn billing_fraction(&self, device: &Device) -> Decimal {
        if self.uses_proration && device.is_prorated {
            Decimal::from(device.billing_days_active) / Decimal::from(self.billing_period_days)
        } else {
            Decimal::ONE
        }
    }
}

/// Cost breakdown for one device or one pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostBreakdown {
    pub base_cost: Decimal,
    pub overage_cost: Decimal,
}

impl CostBreakdown {
    pub const ZERO: CostBreakdown = CostBreakdown {
        base_cost: Decimal::ZERO,
        overage_cost: Decimal::ZERO,
    };

    pub fn total(&self) -> Decimal {
        self.base_cost + self.overage_cost
    }

    /// Value of this breakdown under the optimization objective.
    pub fn objective(&self, charge_type: ChargeType) -> Decimal {
        match charge_type {
            ChargeType::BaseAndOverage => self.total(),
            ChargeType::OverageOnly => self.overage_cost,
            ChargeType::BaseOnly => self.base_cost,
        }
    }
}

/// Overage charge for `usage` against `allowance` on the given pool terms.
/// Billed in whole blocks, rounded up.
pub fn overage_cost(pool: &RatePool, usage: Decimal, allowance: Decimal) -> Decimal {
    let overage_units = (usage - allowance).max(Decimal::ZERO);
    if overage_units.is_zero() {
        return Decimal::ZERO;
    }
    let blocks = (overage_units / pool.overage_block_size).ceil();
    blocks * pool.pool_overage_rate
}

/// Cost of a single device on an unshared pool.
pub fn device_cost(
    pool: &RatePool,
    device: &Device,
    ctx: &BillingContext,
) -> Result<CostBreakdown, ModelError> {
    device.validate(ctx.billing_period_days)?;

    let fraction = ctx.billing_fraction(device);
    let base_cost = pool.pool_base_cost * fraction;
    let effective_allowance = pool.pool_allowance * fraction;
    let overage = overage_cost(pool, device.usage_for_period, effective_allowance);

    Ok(CostBreakdown {
        base_cost,
        overage_cost: overage,
    })
}

/// Effective allowance a device contributes to a shared pool.
pub fn effective_allowance(pool: &RatePool, device: &Device, ctx: &BillingContext) -> Decimal {
    pool.pool_allowance * ctx.billing_fraction(device)
}

/// Cost of a shared pool over its member set: base once, overage once on the
/// aggregate. Allowances are summed with each device's own proration.
pub fn shared_pool_cost(
    pool: &RatePool,
    members: &[&Device],
    ctx: &BillingContext,
) -> Result<CostBreakdown, ModelError> {
    if members.is_empty() {
        return Ok(CostBreakdown::ZERO);
    }

    let mut aggregate_usage = Decimal::ZERO;
    let mut aggregate_allowance = Decimal::ZERO;
    for device in members {
        device.validate(ctx.billing_period_days)?;
        aggregate_usage += device.usage_for_period;
        aggregate_allowance += effective_allowance(pool, device, ctx);
    }

    Ok(CostBreakdown {
        base_cost: pool.pool_base_cost,
        overage_cost: overage_cost(pool, aggregate_usage, aggregate_allowance),
    })
}

/// Attribute a shared pool's cost to its members: the pool base lands on the
/// first-placed member, overage splits proportionally to usage with the last
/// member absorbing the rounding remainder so row sums match the pool exactly.
pub fn attribute_shared_cost(
    pool: &RatePool,
    members: &[&Device],
    pool_cost: &CostBreakdown,
) -> Vec<DeviceResult> {
    let total_usage: Decimal = members.iter().map(|d| d.usage_for_period).sum();
    let mut rows = Vec::with_capacity(members.len());
    let mut overage_assigned = Decimal::ZERO;

    for (i, device) in members.iter().enumerate() {
        let base_cost = if i == 0 {
            pool_cost.base_cost
        } else {
            Decimal::ZERO
        };
        let overage = if i + 1 == members.len() {
            pool_cost.overage_cost - overage_assigned
        } else if total_usage.is_zero() {
            Decimal::ZERO
        } else {
            let share =
                (pool_cost.overage_cost * device.usage_for_period / total_usage).round_dp(4);
            overage_assigned += share;
            share
        };
        rows.push(DeviceResult {
            device_id: device.device_id,
            assigned_rate_plan_id: pool.rate_plan_id,
            base_cost,
            overage_cost: overage,
            total_cost: base_cost + overage,
        });
    }

    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PlanType;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn pool(base: Decimal, allowance: Decimal, shared: bool) -> RatePool {
        RatePool {
            rate_plan_id: 1,
            plan_type: PlanType::Data,
            pool_allowance: allowance,
            pool_base_cost: base,
            pool_overage_rate: dec!(5),
            overage_block_size: dec!(100),
            is_shared: shared,
        }
    }

    fn device(id: i64, usage: Decimal, days: u32, prorated: bool) -> Device {
        Device {
            device_id: id,
            comm_plan_id: 1,
            current_rate_plan_id: 1,
            usage_for_period: usage,
            activation_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            billing_days_active: days,
            is_prorated: prorated,
        }
    }

    #[test]
    fn single_device_no_overage() {
        // usage 100 MB against a 1000 MB allowance: base only
        let ctx = BillingContext::new(30, false).unwrap();
        let cost = device_cost(&pool(dec!(10), dec!(1000), false), &device(1, dec!(100), 30, false), &ctx)
            .unwrap();
        assert_eq!(cost.base_cost, dec!(10));
        assert_eq!(cost.overage_cost, dec!(0));
        assert_eq!(cost.total(), dec!(10.00));
    }

    #[test]
    fn single_device_with_overage() {
        // 1250 MB: 250 over, 3 blocks of 100 at $5
        let ctx = BillingContext::new(30, false).unwrap();
        let cost = device_cost(&pool(dec!(10), dec!(1000), false), &device(1, dec!(1250), 30, false), &ctx)
            .unwrap();
        assert_eq!(cost.overage_cost, dec!(15));
        assert_eq!(cost.total(), dec!(25.00));
    }

    #[test]
    fn prorated_device_halves_base_and_allowance() {
        // 15 of 30 days: base $20 -> $10, allowance 1000 -> 500, usage 400 fits
        let ctx = BillingContext::new(30, true).unwrap();
        let cost = device_cost(&pool(dec!(20), dec!(1000), false), &device(1, dec!(400), 15, true), &ctx)
            .unwrap();
        assert_eq!(cost.base_cost, dec!(10));
        assert_eq!(cost.overage_cost, dec!(0));
        assert_eq!(cost.total(), dec!(10.00));
    }

    #[test]
    fn proration_needs_both_flags() {
        let ctx = BillingContext::new(30, false).unwrap();
        let d = device(1, dec!(400), 15, true);
        assert_eq!(ctx.billing_fraction(&d), dec!(1));

        let ctx = BillingContext::new(30, true).unwrap();
        assert_eq!(ctx.billing_fraction(&d), dec!(0.5));
    }

    #[test]
    fn shared_pool_charges_base_once_and_aggregates_overage() {
        // Two devices at 600 MB on a shared 1000 MB pool: 200 over, 2 blocks
        let ctx = BillingContext::new(30, false).unwrap();
        let p = pool(dec!(10), dec!(1000), true);
        let a = device(1, dec!(600), 30, false);
        let b = device(2, dec!(600), 30, false);

        let cost = shared_pool_cost(&p, &[&a, &b], &ctx).unwrap();
        assert_eq!(cost.base_cost, dec!(10));
        assert_eq!(cost.overage_cost, dec!(10));
        assert_eq!(cost.total(), dec!(20.00));
    }

    #[test]
    fn shared_attribution_preserves_the_aggregate() {
        let ctx = BillingContext::new(30, false).unwrap();
        let p = pool(dec!(10), dec!(1000), true);
        let a = device(1, dec!(900), 30, false);
        let b = device(2, dec!(300), 30, false);
        let c = device(3, dec!(250), 30, false);
        let members = [&a, &b, &c];

        let cost = shared_pool_cost(&p, &members, &ctx).unwrap();
        let rows = attribute_shared_cost(&p, &members, &cost);

        let base_sum: Decimal = rows.iter().map(|r| r.base_cost).sum();
        let overage_sum: Decimal = rows.iter().map(|r| r.overage_cost).sum();
        assert_eq!(base_sum, cost.base_cost);
        assert_eq!(overage_sum, cost.overage_cost);
        // first-placed member carries the base
        assert_eq!(rows[0].base_cost, dec!(10));
        assert_eq!(rows[1].base_cost, dec!(0));
    }

    #[test]
    fn empty_shared_pool_costs_nothing() {
        let ctx = BillingContext::new(30, false).unwrap();
        let cost = shared_pool_cost(&pool(dec!(10), dec!(1000), true), &[], &ctx).unwrap();
        assert_eq!(cost, CostBreakdown::ZERO);
    }

    #[test]
    fn total_is_base_plus_overage() {
        let ctx = BillingContext::new(30, true).unwrap();
        let p = pool(dec!(12.3456), dec!(750), false);
        for usage in [dec!(0), dec!(750), dec!(751), dec!(2000.5)] {
            let cost = device_cost(&p, &device(1, usage, 30, false), &ctx).unwrap();
            assert_eq!(cost.total(), cost.base_cost + cost.overage_cost);
        }
    }

    #[test]
    fn objective_selects_terms() {
        let cost = CostBreakdown {
            base_cost: dec!(10),
            overage_cost: dec!(15),
        };
        assert_eq!(cost.objective(ChargeType::BaseAndOverage), dec!(25));
        assert_eq!(cost.objective(ChargeType::OverageOnly), dec!(15));
        assert_eq!(cost.objective(ChargeType::BaseOnly), dec!(10));
    }

    #[test]
    fn device_active_longer_than_period_is_invalid() {
        let ctx = BillingContext::new(30, true).unwrap();
        let err = device_cost(&pool(dec!(10), dec!(1000), false), &device(1, dec!(10), 31, true), &ctx)
            .unwrap_err();
        assert!(matches!(err, ModelError::ActiveDaysExceedPeriod { .. }));
    }
}
