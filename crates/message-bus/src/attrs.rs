//! Typed views over message attributes
//!
//! Work messages and sequence-generation messages share the bus; the runtime
//! routes by attribute presence, never by queue name alone.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use rate_model::{ChargeType, CommGroupId, QueueId, RatePlanSequence, SessionId};
use utils::{join_ids, parse_id_list};

use crate::error::BusError;
use crate::message::WorkMessage;

/// Attribute keys of the work-message contract
pub mod keys {
    pub const QUEUE_IDS: &str = "QueueIds";
    pub const IS_CHAINING_PROCESS: &str = "IsChainingProcess";
    pub const SKIP_LOWER_COST_CHECK: &str = "SkipLowerCostCheck";
    pub const CHARGE_TYPE: &str = "ChargeType";
    pub const SESSION_ID: &str = "SessionId";
    pub const CONTINUATION_ATTEMPT: &str = "ContinuationAttempt";
    pub const RATE_PLAN_SEQUENCES: &str = "RatePlanSequences";
    pub const COMM_GROUP_ID: &str = "CommGroupId";
}

/// Parsed work-message contract
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkOrder {
    pub queue_ids: Vec<QueueId>,
    /// True on continuation messages re-enqueued by a timed-out worker
    pub is_continuation: bool,
    pub skip_lower_cost_check: bool,
    pub charge_type: ChargeType,
    pub session_id: SessionId,
    /// 0-based retry counter, monotonically incremented per continuation
    pub continuation_attempt: u32,
}

impl WorkOrder {
    pub fn from_message(message: &WorkMessage) -> Result<Self, BusError> {
        let queue_ids_raw = require(message, keys::QUEUE_IDS)?;
        let queue_ids = parse_id_list(queue_ids_raw).map_err(|_| BusError::InvalidAttribute {
            key: keys::QUEUE_IDS,
            value: queue_ids_raw.to_string(),
        })?;

        let session_id_raw = require(message, keys::SESSION_ID)?;
        let session_id = session_id_raw
            .parse::<SessionId>()
            .map_err(|_| BusError::InvalidAttribute {
                key: keys::SESSION_ID,
                value: session_id_raw.to_string(),
            })?;

        let charge_type = match message.attribute(keys::CHARGE_TYPE) {
            Some(raw) => {
                let code = raw.parse::<i32>().map_err(|_| BusError::InvalidAttribute {
                    key: keys::CHARGE_TYPE,
                    value: raw.to_string(),
                })?;
                ChargeType::from_code(code).map_err(|_| BusError::InvalidAttribute {
                    key: keys::CHARGE_TYPE,
                    value: raw.to_string(),
                })?
            }
            None => ChargeType::default(),
        };

        let continuation_attempt = match message.attribute(keys::CONTINUATION_ATTEMPT) {
            Some(raw) => raw.parse::<u32>().map_err(|_| BusError::InvalidAttribute {
                key: keys::CONTINUATION_ATTEMPT,
                value: raw.to_string(),
            })?,
            None => 0,
        };

        Ok(WorkOrder {
            queue_ids,
            is_continuation: flag(message, keys::IS_CHAINING_PROCESS),
            skip_lower_cost_check: flag(message, keys::SKIP_LOWER_COST_CHECK),
            charge_type,
            session_id,
            continuation_attempt,
        })
    }

    pub fn to_attributes(&self) -> HashMap<String, String> {
        let mut attributes = HashMap::new();
        attributes.insert(keys::QUEUE_IDS.to_string(), join_ids(&self.queue_ids));
        attributes.insert(
            keys::IS_CHAINING_PROCESS.to_string(),
            self.is_continuation.to_string(),
        );
        attributes.insert(
            keys::SKIP_LOWER_COST_CHECK.to_string(),
            self.skip_lower_cost_check.to_string(),
        );
        attributes.insert(
            keys::CHARGE_TYPE.to_string(),
            self.charge_type.code().to_string(),
        );
        attributes.insert(keys::SESSION_ID.to_string(), self.session_id.to_string());
        attributes.insert(
            keys::CONTINUATION_ATTEMPT.to_string(),
            self.continuation_attempt.to_string(),
        );
        attributes
    }

    /// The continuation of this order over the remaining queue set: same
    /// contract, chaining flag raised, attempt counter bumped.
    pub fn continuation(&self, remaining: Vec<QueueId>) -> WorkOrder {
        WorkOrder {
            queue_ids: remaining,
            is_continuation: true,
            continuation_attempt: self.continuation_attempt + 1,
            ..self.clone()
        }
    }
}

/// Sequence-generation message payload (consumed by the orchestrator lane,
/// recognized by the worker runtime only to route it away)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationPayload {
    pub comm_group_id: CommGroupId,
    pub sequences: Vec<RatePlanSequence>,
}

impl GenerationPayload {
    pub fn from_message(message: &WorkMessage) -> Result<Self, BusError> {
        let comm_group_raw = require(message, keys::COMM_GROUP_ID)?;
        let comm_group_id =
            comm_group_raw
                .parse::<CommGroupId>()
                .map_err(|_| BusError::InvalidAttribute {
                    key: keys::COMM_GROUP_ID,
                    value: comm_group_raw.to_string(),
                })?;
        let sequences_raw = require(message, keys::RATE_PLAN_SEQUENCES)?;
        let sequences: Vec<RatePlanSequence> = serde_json::from_str(sequences_raw)?;
        Ok(GenerationPayload {
            comm_group_id,
            sequences,
        })
    }

    pub fn to_attributes(&self) -> Result<HashMap<String, String>, BusError> {
        let mut attributes = HashMap::new();
        attributes.insert(
            keys::COMM_GROUP_ID.to_string(),
            self.comm_group_id.to_string(),
        );
        attributes.insert(
            keys::RATE_PLAN_SEQUENCES.to_string(),
            serde_json::to_string(&self.sequences)?,
        );
        Ok(attributes)
    }
}

/// Generation messages are routed by attribute presence.
pub fn is_generation_message(message: &WorkMessage) -> bool {
    message.attributes.contains_key(keys::RATE_PLAN_SEQUENCES)
}

fn require<'a>(message: &'a WorkMessage, key: &'static str) -> Result<&'a str, BusError> {
    message
        .attribute(key)
        .ok_or(BusError::MissingAttribute(key))
}

fn flag(message: &WorkMessage, key: &str) -> bool {
    message
        .attribute(key)
        .map(|v| v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order() -> WorkOrder {
        WorkOrder {
            queue_ids: vec![4, 2, 9],
            is_continuation: false,
            skip_lower_cost_check: true,
            charge_type: ChargeType::OverageOnly,
            session_id: 31,
            continuation_attempt: 0,
        }
    }

    #[test]
    fn work_order_round_trips_through_attributes() {
        let message = WorkMessage::new("{}", order().to_attributes());
        assert_eq!(WorkOrder::from_message(&message).unwrap(), order());
    }

    #[test]
    fn absent_chaining_flag_means_fresh_run() {
        let mut attributes = order().to_attributes();
        attributes.remove(keys::IS_CHAINING_PROCESS);
        attributes.remove(keys::CONTINUATION_ATTEMPT);
        attributes.remove(keys::CHARGE_TYPE);

        let parsed = WorkOrder::from_message(&WorkMessage::new("{}", attributes)).unwrap();
        assert!(!parsed.is_continuation);
        assert_eq!(parsed.continuation_attempt, 0);
        assert_eq!(parsed.charge_type, ChargeType::BaseAndOverage);
    }

    #[test]
    fn missing_queue_ids_is_an_error() {
        let mut attributes = order().to_attributes();
        attributes.remove(keys::QUEUE_IDS);
        assert!(matches!(
            WorkOrder::from_message(&WorkMessage::new("{}", attributes)),
            Err(BusError::MissingAttribute(keys::QUEUE_IDS))
        ));
    }

    #[test]
    fn continuation_preserves_contract_and_bumps_attempt() {
        let continuation = order().continuation(vec![2, 9]);
        assert!(continuation.is_continuation);
        assert_eq!(continuation.continuation_attempt, 1);
        assert_eq!(continuation.queue_ids, vec![2, 9]);
        assert_eq!(continuation.charge_type, order().charge_type);
        assert_eq!(continuation.session_id, order().session_id);
    }

    #[test]
    fn generation_messages_route_by_attribute_presence() {
        let payload = GenerationPayload {
            comm_group_id: 12,
            sequences: vec![RatePlanSequence::new(vec![1, 2, 3])],
        };
        let message = WorkMessage::new("{}", payload.to_attributes().unwrap());
        assert!(is_generation_message(&message));

        let parsed = GenerationPayload::from_message(&message).unwrap();
        assert_eq!(parsed.comm_group_id, 12);
        assert_eq!(parsed.sequences.len(), 1);

        let work = WorkMessage::new("{}", order().to_attributes());
        assert!(!is_generation_message(&work));
    }
}
