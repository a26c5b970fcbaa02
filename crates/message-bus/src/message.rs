//! Message envelope

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One message on the bus. The body is opaque (diagnostics only); the
/// attributes carry the contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkMessage {
    pub message_id: Uuid,
    pub body: String,
    pub attributes: HashMap<String, String>,
    /// Incremented by the bus on every delivery
    pub receive_count: u32,
}

impl WorkMessage {
    pub fn new(body: impl Into<String>, attributes: HashMap<String, String>) -> Self {
        Self {
            message_id: Uuid::new_v4(),
            body: body.into(),
            attributes,
            receive_count: 0,
        }
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }
}
