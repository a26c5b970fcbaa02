//! Assigner errors

use thiserror::Error;

/// Snapshot (de)serialization failures. Algorithm-level failures never abort
/// the engine; they are recorded per queue in its outcome.
#[derive(Debug, Error)]
pub enum AssignerError {
    #[error("checkpoint serialization failed: {0}")]
    SnapshotEncode(#[source] serde_json::Error),

    #[error("checkpoint is corrupt or from an incompatible version: {0}")]
    SnapshotDecode(String),
}
