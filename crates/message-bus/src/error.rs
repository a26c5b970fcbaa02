//! Messaging errors

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum BusError {
    #[error("send failed: {0}")]
    Send(String),

    #[error("receive failed: {0}")]
    Receive(String),

    #[error("unknown message: {0}")]
    UnknownMessage(Uuid),

    #[error("missing message attribute: {0}")]
    MissingAttribute(&'static str),

    #[error("invalid value for attribute {key}: {value}")]
    InvalidAttribute { key: &'static str, value: String },

    #[error("payload error: {0}")]
    Payload(#[from] serde_json::Error),
}
