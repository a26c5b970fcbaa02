//! Checkpoint store interface

use async_trait::async_trait;

use crate::error::CheckpointError;

/// Checkpoints are evicted after an hour; a continuation arriving later
/// finds nothing and the queue takes the checkpoint-lost branch.
pub const DEFAULT_CHECKPOINT_TTL_SECS: u64 = 3600;

/// Keyed byte store with TTL. Advisory, not authoritative: the runtime
/// treats a missing value as state lost, never as corruption.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Atomic overwrite with a TTL in seconds.
    async fn put(&self, key: &str, value: &[u8], ttl_secs: u64) -> Result<(), CheckpointError>;

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CheckpointError>;

    async fn delete(&self, key: &str) -> Result<(), CheckpointError>;
}
