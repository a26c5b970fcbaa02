//! Per-execution worker context
//!
//! Everything a worker invocation carries is explicit: deadline, session
//! scope, cancellation, attempt counter. No ambient state, so the assigner
//! stays unit-testable.

use assigner::{CancelFlag, RunContext};
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use rate_model::SessionId;

#[derive(Debug, Clone)]
pub struct WorkerContext {
    pub worker_id: Uuid,
    pub session_id: SessionId,
    /// Absolute soft deadline the assigner checks between placements
    pub deadline: DateTime<Utc>,
    pub cancel: CancelFlag,
    pub continuation_attempt: u32,
}

impl WorkerContext {
    /// Derive the context from the host's remaining execution budget, keeping
    /// a safety margin for finalization work after the assigner yields.
    pub fn new(
        session_id: SessionId,
        host_budget: Duration,
        safety_margin_secs: i64,
        continuation_attempt: u32,
    ) -> Self {
        Self {
            worker_id: Uuid::new_v4(),
            session_id,
            deadline: Utc::now() + host_budget - Duration::seconds(safety_margin_secs),
            cancel: CancelFlag::new(),
            continuation_attempt,
        }
    }

    pub fn run_context(&self) -> RunContext {
        RunContext {
            soft_deadline: self.deadline,
            cancel: self.cancel.clone(),
        }
    }
}
