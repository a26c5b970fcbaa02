//! Workload loading seam
//!
//! Devices and pool catalogs come from staging tables owned by the carrier
//! sync (an external collaborator), so the runtime loads workloads through
//! this trait. The in-memory implementation backs tests and local runs.

use async_trait::async_trait;
use dashmap::DashMap;
use thiserror::Error;

use assigner::QueueJob;
use rate_model::{ModelError, QueueId};

/// Loader failures, split into fail-fast configuration problems and
/// transient backend errors worth retrying.
#[derive(Debug, Error)]
pub enum LoaderError {
    /// Ineligible plan, oversized comm group, no devices: the queue set is
    /// marked CompletedError and the session moves on
    #[error("configuration error: {0}")]
    Configuration(#[from] ModelError),

    #[error("no workload found for queue {0}")]
    MissingWorkload(QueueId),

    #[error("workload backend error: {0}")]
    Backend(String),
}

impl LoaderError {
    /// Fail-fast errors scoped to the queue set; everything else is
    /// transient infrastructure.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            LoaderError::Configuration(_) | LoaderError::MissingWorkload(_)
        )
    }
}

/// Loads the prepared jobs for a claimed queue set.
#[async_trait]
pub trait WorkloadLoader: Send + Sync {
    async fn load(&self, queue_ids: &[QueueId]) -> Result<Vec<QueueJob>, LoaderError>;
}

/// Workloads registered up front; used by tests and the local demo.
#[derive(Default)]
pub struct InMemoryWorkloadLoader {
    jobs: DashMap<QueueId, QueueJob>,
}

impl InMemoryWorkloadLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, job: QueueJob) {
        self.jobs.insert(job.queue_id, job);
    }
}

#[async_trait]
impl WorkloadLoader for InMemoryWorkloadLoader {
    async fn load(&self, queue_ids: &[QueueId]) -> Result<Vec<QueueJob>, LoaderError> {
        queue_ids
            .iter()
            .map(|id| {
                self.jobs
                    .get(id)
                    .map(|j| j.value().clone())
                    .ok_or(LoaderError::MissingWorkload(*id))
            })
            .collect()
    }
}
