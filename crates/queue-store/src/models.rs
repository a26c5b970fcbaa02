//! Persisted rows for sessions, instances, comm groups, and queues

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use rate_model::{
    CommGroupId, InstanceId, PortalType, QueueId, RatePlanId, ServiceProviderId, SessionId,
};

use crate::error::QueueStoreError;

/// Queue lifecycle status
///
/// ```text
/// NotStarted -> Running -> CompletedSuccess
///                       -> CompletedError
///                       -> Abandoned (reclaimed after being stuck)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QueueStatus {
    NotStarted,
    Running,
    CompletedSuccess,
    CompletedError,
    Abandoned,
}

impl QueueStatus {
    /// Statuses that count toward session completion; a worker receiving a
    /// message for a queue already in one of these no-ops.
    pub fn is_finished(&self) -> bool {
        matches!(
            self,
            QueueStatus::CompletedSuccess | QueueStatus::CompletedError
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            QueueStatus::NotStarted => "NOT_STARTED",
            QueueStatus::Running => "RUNNING",
            QueueStatus::CompletedSuccess => "COMPLETED_SUCCESS",
            QueueStatus::CompletedError => "COMPLETED_ERROR",
            QueueStatus::Abandoned => "ABANDONED",
        }
    }

    pub fn parse(s: &str) -> Result<Self, QueueStoreError> {
        match s {
            "NOT_STARTED" => Ok(QueueStatus::NotStarted),
            "RUNNING" => Ok(QueueStatus::Running),
            "COMPLETED_SUCCESS" => Ok(QueueStatus::CompletedSuccess),
            "COMPLETED_ERROR" => Ok(QueueStatus::CompletedError),
            "ABANDONED" => Ok(QueueStatus::Abandoned),
            other => Err(QueueStoreError::InvalidStatus(other.to_string())),
        }
    }
}

pub fn portal_type_to_string(portal: PortalType) -> &'static str {
    match portal {
        PortalType::M2M => "M2M",
        PortalType::Mobility => "MOBILITY",
        PortalType::CrossProvider => "CROSS_PROVIDER",
    }
}

pub fn parse_portal_type(s: &str) -> Result<PortalType, QueueStoreError> {
    match s {
        "M2M" => Ok(PortalType::M2M),
        "MOBILITY" => Ok(PortalType::Mobility),
        "CROSS_PROVIDER" => Ok(PortalType::CrossProvider),
        other => Err(QueueStoreError::InvalidPortalType(other.to_string())),
    }
}

/// `optimization_session` row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizationSessionRow {
    pub id: SessionId,
    pub tenant_id: i64,
    pub billing_period_id: i64,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

/// `optimization_instance` row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizationInstanceRow {
    pub id: InstanceId,
    pub session_id: SessionId,
    pub service_provider_id: ServiceProviderId,
    pub portal_type: PortalType,
    pub is_customer_optimization: bool,
    pub billing_period_start: NaiveDate,
    pub billing_period_end: NaiveDate,
}

/// `optimization_comm_group` row; plan ids are stored sorted comma-joined
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizationCommGroupRow {
    pub id: CommGroupId,
    pub instance_id: InstanceId,
    pub rate_plan_ids: Vec<RatePlanId>,
}

/// `optimization_queue` row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizationQueueRow {
    pub id: QueueId,
    pub instance_id: InstanceId,
    pub comm_group_id: CommGroupId,
    pub service_provider_id: ServiceProviderId,
    pub status: QueueStatus,
    pub total_cost: Option<Decimal>,
    pub error_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl OptimizationQueueRow {
    /// A freshly seeded queue, not yet claimed by any worker.
    pub fn seeded(
        id: QueueId,
        instance_id: InstanceId,
        comm_group_id: CommGroupId,
        service_provider_id: ServiceProviderId,
    ) -> Self {
        Self {
            id,
            instance_id,
            comm_group_id,
            service_provider_id,
            status: QueueStatus::NotStarted,
            total_cost: None,
            error_reason: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }
}

/// Winner of a communication group: lowest total cost, ties to lowest id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WinningQueue {
    pub comm_group_id: CommGroupId,
    pub queue_id: QueueId,
    pub total_cost: Decimal,
}
