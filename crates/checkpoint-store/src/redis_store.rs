//! Redis checkpoint store

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use crate::error::CheckpointError;
use crate::store::CheckpointStore;

/// Production checkpoint store over a Redis connection manager
pub struct RedisCheckpointStore {
    connection: ConnectionManager,
}

impl RedisCheckpointStore {
    pub async fn new(url: &str) -> Result<Self, CheckpointError> {
        let client =
            redis::Client::open(url).map_err(|e| CheckpointError::Connection(e.to_string()))?;
        let connection = ConnectionManager::new(client)
            .await
            .map_err(|e| CheckpointError::Connection(e.to_string()))?;
        Ok(Self { connection })
    }
}

#[async_trait]
impl CheckpointStore for RedisCheckpointStore {
    async fn put(&self, key: &str, value: &[u8], ttl_secs: u64) -> Result<(), CheckpointError> {
        let mut conn = self.connection.clone();
        conn.set_ex::<_, _, ()>(key, value, ttl_secs).await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CheckpointError> {
        let mut conn = self.connection.clone();
        let value: Option<Vec<u8>> = conn.get(key).await?;
        Ok(value)
    }

    async fn delete(&self, key: &str) -> Result<(), CheckpointError> {
        let mut conn = self.connection.clone();
        conn.del::<_, ()>(key).await?;
        Ok(())
    }
}
