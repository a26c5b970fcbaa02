//! Versioned checkpoint encoding
//!
//! The snapshot is a tagged, self-describing record rather than an opaque
//! binary blob: a worker built from the same codebase version deserializes
//! it, and a corrupt or incompatible payload decodes to an error (the
//! "checkpoint lost" branch) instead of crashing the worker.

use serde::{Deserialize, Serialize};

use crate::engine::BatchAssigner;
use crate::error::AssignerError;

#[derive(Serialize, Deserialize)]
#[serde(tag = "version")]
enum CheckpointEnvelope {
    #[serde(rename = "1")]
    V1 { assigner: BatchAssigner },
}

impl BatchAssigner {
    /// Serialize the full engine state, inputs included, so a continuation
    /// worker needs nothing but this payload to resume.
    pub fn to_checkpoint(&self) -> Result<Vec<u8>, AssignerError> {
        serde_json::to_vec(&CheckpointEnvelope::V1 {
            assigner: self.clone(),
        })
        .map_err(AssignerError::SnapshotEncode)
    }

    pub fn from_checkpoint(bytes: &[u8]) -> Result<Self, AssignerError> {
        let envelope: CheckpointEnvelope = serde_json::from_slice(bytes)
            .map_err(|e| AssignerError::SnapshotDecode(e.to_string()))?;
        match envelope {
            CheckpointEnvelope::V1 { assigner } => Ok(assigner),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn corrupt_payload_is_an_error_not_a_panic() {
        assert!(BatchAssigner::from_checkpoint(b"{not json").is_err());
        assert!(BatchAssigner::from_checkpoint(b"{\"version\":\"99\"}").is_err());
        assert!(BatchAssigner::from_checkpoint(b"").is_err());
    }

    #[test]
    fn fresh_engine_round_trips() {
        let engine = BatchAssigner::new(Vec::new(), Default::default());
        let bytes = engine.to_checkpoint().unwrap();
        let restored = BatchAssigner::from_checkpoint(&bytes).unwrap();
        assert!(!restored.is_completed());
        assert!(restored.unfinished_queue_ids().is_empty());
    }
}
