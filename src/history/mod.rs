mod file;
mod memory;
mod redis;

pub use self::file::FileSnapshotStore;
pub use self::memory::MemorySnapshotStore;
pub use self::redis::RedisSnapshotStore;

use async_trait::async_trait;
use log::info;
use std::error::Error;
use std::sync::Arc;
use thiserror::Error as ThisError;

use crate::cli::Args;
use crate::models::chat::{ Message, SessionSnapshot };

#[derive(Debug, ThisError)]
pub enum PersistenceError {
    #[error("persistence I/O error: {0}")] Io(#[from] std::io::Error),
    #[error("snapshot serialization error: {0}")] Serialization(#[from] serde_json::Error),
    #[error("redis error: {0}")] Redis(#[from] ::redis::RedisError),
    #[error("persistence backend error: {0}")] Backend(String),
}

/// Whole-snapshot persistence. `save` replaces the stored snapshot atomically; `load` of a
/// store that was never written returns an empty snapshot.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    async fn save(&self, snapshot: &SessionSnapshot) -> Result<(), PersistenceError>;

    async fn load(&self) -> Result<SessionSnapshot, PersistenceError>;

    fn describe(&self) -> String;
}

pub fn create_snapshot_store(
    args: &Args
) -> Result<Arc<dyn SnapshotStore>, Box<dyn Error + Send + Sync>> {
    match args.history_type.to_lowercase().as_str() {
        "file" => Ok(Arc::new(FileSnapshotStore::new(&args.data_dir))),
        "redis" => {
            let store = RedisSnapshotStore::new(
                &args.history_redis_url,
                &args.history_redis_prefix
            )?;
            Ok(Arc::new(store))
        }
        "memory" => Ok(Arc::new(MemorySnapshotStore::new())),
        _ =>
            Err(
                Box::new(
                    std::io::Error::new(
                        std::io::ErrorKind::InvalidInput,
                        format!("Unsupported history store type: {}", args.history_type)
                    )
                )
            ),
    }
}

pub fn initialize_snapshot_store(
    args: &Args
) -> Result<Arc<dyn SnapshotStore>, Box<dyn Error + Send + Sync>> {
    let store = create_snapshot_store(args)?;
    info!("Session will be stored in: {}", store.describe());
    Ok(store)
}

/// Renders earlier turns as `User:`/`Assistant:` lines. Messages with nothing to replay are skipped.
pub fn format_history_for_prompt(messages: &[Message]) -> String {
    let lines: Vec<String> = messages
        .iter()
        .filter(|msg| !msg.history_text().trim().is_empty())
        .map(|msg| format!("{}: {}\n", msg.role, msg.history_text()))
        .collect();
    if lines.is_empty() {
        return String::new();
    }

    let mut result = String::from("Previous conversation:\n");
    for line in lines {
        result.push_str(&line);
    }
    result
}
