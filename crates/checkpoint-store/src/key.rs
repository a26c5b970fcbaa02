//! Checkpoint key formula

use rate_model::{QueueId, SessionId};
use utils::join_ids;

const KEY_PREFIX: &str = "opt-ckpt";

/// Key for the checkpoint covering a queue set within a session. Queue ids
/// are sorted so any worker holding the same set derives the same key.
pub fn checkpoint_key(session_id: SessionId, queue_ids: &[QueueId]) -> String {
    let mut sorted = queue_ids.to_vec();
    sorted.sort_unstable();
    format!("{}:{}:{}", KEY_PREFIX, session_id, join_ids(&sorted))
}
