//! Error types for the rate model

use thiserror::Error;

use crate::models::{CommGroupId, DeviceId, RatePlanId};

/// Model and cost-calculation errors
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("rate plan {0} is ineligible: overage rate and block size must be positive")]
    IneligibleRatePlan(RatePlanId),

    #[error("communication group {comm_group_id} has {count} candidate rate plans (max {max})")]
    TooManyRatePlans {
        comm_group_id: CommGroupId,
        count: usize,
        max: usize,
    },

    #[error("communication group {0} has no devices")]
    NoDevices(CommGroupId),

    #[error("unknown rate plan: {0}")]
    UnknownRatePlan(RatePlanId),

    #[error("device {device_id} has negative usage for the period")]
    NegativeUsage { device_id: DeviceId },

    #[error("billing period must span at least one day")]
    EmptyBillingPeriod,

    #[error("device {device_id} is active {days_active} days, longer than the {period_days}-day billing period")]
    ActiveDaysExceedPeriod {
        device_id: DeviceId,
        days_active: u32,
        period_days: u32,
    },

    #[error("invalid charge type code: {0}")]
    InvalidChargeType(i32),
}
