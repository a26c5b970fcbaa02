//! In-memory message bus for tests and local development

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use log::warn;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::bus::{queues, MessageBus};
use crate::error::BusError;
use crate::message::WorkMessage;

#[derive(Debug, Clone)]
struct StoredMessage {
    message: WorkMessage,
    visible_at: DateTime<Utc>,
}

/// At-least-once in-memory bus with visibility timeouts and a dead-letter
/// queue per source queue.
pub struct InMemoryMessageBus {
    queues: Mutex<HashMap<String, Vec<StoredMessage>>>,
    max_receive_count: u32,
}

impl InMemoryMessageBus {
    pub fn new(max_receive_count: u32) -> Self {
        Self {
            queues: Mutex::new(HashMap::new()),
            max_receive_count,
        }
    }

    /// Messages currently on a queue, visible or not.
    pub async fn len(&self, queue: &str) -> usize {
        self.queues
            .lock()
            .await
            .get(queue)
            .map(Vec::len)
            .unwrap_or(0)
    }
}

impl Default for InMemoryMessageBus {
    fn default() -> Self {
        Self::new(5)
    }
}

#[async_trait]
impl MessageBus for InMemoryMessageBus {
    async fn send(&self, queue: &str, message: WorkMessage) -> Result<(), BusError> {
        let mut guard = self.queues.lock().await;
        guard.entry(queue.to_string()).or_default().push(StoredMessage {
            message,
            visible_at: Utc::now(),
        });
        Ok(())
    }

    async fn receive(
        &self,
        queue: &str,
        max_messages: usize,
        visibility_timeout: Duration,
    ) -> Result<Vec<WorkMessage>, BusError> {
        let mut guard = self.queues.lock().await;
        let now = Utc::now();
        let mut delivered = Vec::new();
        let mut dead = Vec::new();

        if let Some(entries) = guard.get_mut(queue) {
            for stored in entries.iter_mut() {
                if delivered.len() >= max_messages {
                    break;
                }
                if stored.visible_at > now {
                    continue;
                }
                stored.message.receive_count += 1;
                if stored.message.receive_count > self.max_receive_count {
                    dead.push(stored.message.clone());
                } else {
                    stored.visible_at = now + visibility_timeout;
                    delivered.push(stored.message.clone());
                }
            }
            let dead_ids: Vec<Uuid> = dead.iter().map(|m| m.message_id).collect();
            entries.retain(|s| !dead_ids.contains(&s.message.message_id));
        }

        if !dead.is_empty() {
            let dead_letter = queues::dead_letter(queue);
            warn!(
                "moving {} poison message(s) from {} to {}",
                dead.len(),
                queue,
                dead_letter
            );
            let entries = guard.entry(dead_letter).or_default();
            for message in dead {
                entries.push(StoredMessage {
                    message,
                    visible_at: now,
                });
            }
        }

        Ok(delivered)
    }

    async fn delete(&self, queue: &str, message_id: Uuid) -> Result<(), BusError> {
        let mut guard = self.queues.lock().await;
        if let Some(entries) = guard.get_mut(queue) {
            entries.retain(|s| s.message.message_id != message_id);
        }
        Ok(())
    }

    async fn change_visibility(
        &self,
        queue: &str,
        message_id: Uuid,
        visibility_timeout: Duration,
    ) -> Result<(), BusError> {
        let mut guard = self.queues.lock().await;
        let stored = guard
            .get_mut(queue)
            .and_then(|entries| {
                entries
                    .iter_mut()
                    .find(|s| s.message.message_id == message_id)
            })
            .ok_or(BusError::UnknownMessage(message_id))?;
        stored.visible_at = Utc::now() + visibility_timeout;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap as StdHashMap;

    fn msg() -> WorkMessage {
        WorkMessage::new("{}", StdHashMap::new())
    }

    #[tokio::test]
    async fn received_messages_stay_invisible_until_timeout() {
        let bus = InMemoryMessageBus::default();
        bus.send("q", msg()).await.unwrap();

        let first = bus.receive("q", 10, Duration::seconds(60)).await.unwrap();
        assert_eq!(first.len(), 1);

        // still leased: nothing to deliver
        let second = bus.receive("q", 10, Duration::seconds(60)).await.unwrap();
        assert!(second.is_empty());
    }

    #[tokio::test]
    async fn undeleted_messages_are_redelivered() {
        let bus = InMemoryMessageBus::default();
        bus.send("q", msg()).await.unwrap();

        let first = bus.receive("q", 10, Duration::seconds(0)).await.unwrap();
        let redelivered = bus.receive("q", 10, Duration::seconds(0)).await.unwrap();
        assert_eq!(first[0].message_id, redelivered[0].message_id);
        assert_eq!(redelivered[0].receive_count, 2);
    }

    #[tokio::test]
    async fn deleted_messages_are_gone() {
        let bus = InMemoryMessageBus::default();
        bus.send("q", msg()).await.unwrap();

        let delivered = bus.receive("q", 10, Duration::seconds(0)).await.unwrap();
        bus.delete("q", delivered[0].message_id).await.unwrap();
        assert!(bus.receive("q", 10, Duration::seconds(0)).await.unwrap().is_empty());
        assert_eq!(bus.len("q").await, 0);
    }

    #[tokio::test]
    async fn changing_visibility_returns_a_message_early() {
        let bus = InMemoryMessageBus::default();
        bus.send("q", msg()).await.unwrap();

        let delivered = bus.receive("q", 10, Duration::seconds(600)).await.unwrap();
        assert!(bus.receive("q", 10, Duration::seconds(600)).await.unwrap().is_empty());

        // give up the lease: the message becomes visible again at once
        bus.change_visibility("q", delivered[0].message_id, Duration::seconds(0))
            .await
            .unwrap();
        let redelivered = bus.receive("q", 10, Duration::seconds(600)).await.unwrap();
        assert_eq!(redelivered.len(), 1);
        assert_eq!(redelivered[0].message_id, delivered[0].message_id);
    }

    #[tokio::test]
    async fn changing_visibility_of_an_unknown_message_fails() {
        let bus = InMemoryMessageBus::default();
        let err = bus
            .change_visibility("q", Uuid::new_v4(), Duration::seconds(5))
            .await
            .unwrap_err();
        assert!(matches!(err, BusError::UnknownMessage(_)));
    }

    #[tokio::test]
    async fn poison_messages_land_in_the_dead_letter_queue() {
        let bus = InMemoryMessageBus::new(2);
        bus.send("q", msg()).await.unwrap();

        assert_eq!(bus.receive("q", 10, Duration::seconds(0)).await.unwrap().len(), 1);
        assert_eq!(bus.receive("q", 10, Duration::seconds(0)).await.unwrap().len(), 1);
        // third delivery exceeds the budget
        assert!(bus.receive("q", 10, Duration::seconds(0)).await.unwrap().is_empty());
        assert_eq!(bus.len("q").await, 0);
        assert_eq!(bus.len(&queues::dead_letter("q")).await, 1);
    }
}
