//! In-memory checkpoint store for tests and local development

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;

use crate::error::CheckpointError;
use crate::store::CheckpointStore;

#[derive(Default)]
pub struct InMemoryCheckpointStore {
    entries: DashMap<String, (Vec<u8>, DateTime<Utc>)>,
}

impl InMemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live (non-expired) entries.
    pub fn len(&self) -> usize {
        let now = Utc::now();
        self.entries.iter().filter(|e| e.value().1 > now).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl CheckpointStore for InMemoryCheckpointStore {
    async fn put(&self, key: &str, value: &[u8], ttl_secs: u64) -> Result<(), CheckpointError> {
        let expires_at = Utc::now() + Duration::seconds(ttl_secs as i64);
        self.entries
            .insert(key.to_string(), (value.to_vec(), expires_at));
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CheckpointError> {
        let hit = self
            .entries
            .get(key)
            .map(|entry| (entry.value().0.clone(), entry.value().1));
        match hit {
            Some((payload, expires_at)) if expires_at > Utc::now() => Ok(Some(payload)),
            Some(_) => {
                self.entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn delete(&self, key: &str) -> Result<(), CheckpointError> {
        self.entries.remove(key);
        Ok(())
    }
}
