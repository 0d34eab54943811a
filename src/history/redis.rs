use async_trait::async_trait;
use log::debug;
use redis::{ AsyncCommands, Client };

use super::{ PersistenceError, SnapshotStore };
use crate::models::chat::SessionSnapshot;

pub const SNAPSHOT_KEY: &str = "snapshot";

/// The whole snapshot lives under a single key, so one `SET` replaces it atomically.
pub struct RedisSnapshotStore {
    client: Client,
    key_prefix: String,
}

impl RedisSnapshotStore {
    pub fn new(url: &str, key_prefix: &str) -> Result<Self, PersistenceError> {
        Ok(Self {
            client: Client::open(url)?,
            key_prefix: key_prefix.to_string(),
        })
    }

    pub fn key(&self) -> String {
        format!("{}{}", self.key_prefix, SNAPSHOT_KEY)
    }

    async fn get_connection(&self) -> Result<redis::aio::MultiplexedConnection, redis::RedisError> {
        self.client.get_multiplexed_async_connection().await
    }
}

#[async_trait]
impl SnapshotStore for RedisSnapshotStore {
    async fn save(&self, snapshot: &SessionSnapshot) -> Result<(), PersistenceError> {
        let mut conn = self.get_connection().await?;
        let json = serde_json::to_string(snapshot)?;
        let _: () = conn.set(self.key(), json).await?;
        debug!("Stored snapshot under {}", self.key());
        Ok(())
    }

    async fn load(&self) -> Result<SessionSnapshot, PersistenceError> {
        let mut conn = self.get_connection().await?;
        let stored: Option<String> = conn.get(self.key()).await?;
        match stored {
            Some(json) => Ok(serde_json::from_str(&json)?),
            None => Ok(SessionSnapshot::default()),
        }
    }

    fn describe(&self) -> String {
        format!("redis key {}", self.key())
    }
}
