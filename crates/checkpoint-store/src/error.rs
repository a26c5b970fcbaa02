//! Checkpoint store errors

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("operation error: {0}")]
    Operation(String),
}

impl From<redis::RedisError> for CheckpointError {
    fn from(err: redis::RedisError) -> Self {
        CheckpointError::Operation(err.to_string())
    }
}
