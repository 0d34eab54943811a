use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{ PersistenceError, SnapshotStore };
use crate::models::chat::SessionSnapshot;

#[derive(Default)]
pub struct MemorySnapshotStore {
    snapshot: Mutex<Option<SessionSnapshot>>,
    saves: Mutex<usize>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_snapshot(snapshot: SessionSnapshot) -> Self {
        Self {
            snapshot: Mutex::new(Some(snapshot)),
            saves: Mutex::new(0),
        }
    }

    /// Number of successful saves since construction.
    pub async fn save_count(&self) -> usize {
        *self.saves.lock().await
    }

    pub async fn stored(&self) -> Option<SessionSnapshot> {
        self.snapshot.lock().await.clone()
    }
}

#[async_trait]
impl SnapshotStore for MemorySnapshotStore {
    async fn save(&self, snapshot: &SessionSnapshot) -> Result<(), PersistenceError> {
        *self.snapshot.lock().await = Some(snapshot.clone());
        *self.saves.lock().await += 1;
        Ok(())
    }

    async fn load(&self) -> Result<SessionSnapshot, PersistenceError> {
        Ok(self.snapshot.lock().await.clone().unwrap_or_default())
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}
