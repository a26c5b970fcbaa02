//! Queue store errors

use thiserror::Error;

use rate_model::{InstanceId, QueueId};

#[derive(Debug, Error)]
pub enum QueueStoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("queue not found: {0}")]
    QueueNotFound(QueueId),

    #[error("instance not found: {0}")]
    InstanceNotFound(InstanceId),

    #[error("invalid status value in store: {0}")]
    InvalidStatus(String),

    #[error("invalid portal type value in store: {0}")]
    InvalidPortalType(String),
}

impl QueueStoreError {
    /// Transient errors worth a retry with backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(self, QueueStoreError::Database(_))
    }
}
