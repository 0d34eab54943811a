use std::sync::atomic::{ AtomicBool, AtomicU64, Ordering };
use std::sync::Arc;

use log::{ debug, error, info, warn };
use tokio::sync::Mutex;

use crate::history::{ PersistenceError, SnapshotStore };
use crate::models::chat::SessionSnapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    Saved,
    /// No load has succeeded yet.
    NotLoaded,
    /// Both collections are empty.
    Empty,
    /// A newer revision was already written.
    Stale,
    Failed,
}

/// Guards automatic saving: nothing is written before a successful load, empty snapshots are
/// never written, and a snapshot never overwrites a newer one.
pub struct PersistencePolicy {
    store: Arc<dyn SnapshotStore>,
    loaded: AtomicBool,
    revision: AtomicU64,
    written: Mutex<u64>,
}

impl PersistencePolicy {
    pub fn new(store: Arc<dyn SnapshotStore>) -> Self {
        Self {
            store,
            loaded: AtomicBool::new(false),
            revision: AtomicU64::new(0),
            written: Mutex::new(0),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.loaded.load(Ordering::SeqCst)
    }

    /// Reads the stored snapshot. Success enables autosave; failure leaves the flag as it was.
    pub async fn load(&self) -> Result<SessionSnapshot, PersistenceError> {
        match self.store.load().await {
            Ok(snapshot) => {
                info!(
                    "Loaded {} conversations and {} messages from {}",
                    snapshot.conversations.len(),
                    snapshot.messages.len(),
                    self.store.describe()
                );
                self.loaded.store(true, Ordering::SeqCst);
                Ok(snapshot)
            }
            Err(e) => {
                error!("Failed to load session from {}: {}", self.store.describe(), e);
                Err(e)
            }
        }
    }

    /// Call while the session lock is held so revisions follow mutation order.
    pub fn next_revision(&self) -> u64 {
        self.revision.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub async fn save(&self, revision: u64, snapshot: &SessionSnapshot) -> SaveOutcome {
        if !self.is_enabled() {
            debug!("Skipping save of revision {}: session not loaded", revision);
            return SaveOutcome::NotLoaded;
        }
        if snapshot.is_empty() {
            debug!("Skipping save of revision {}: nothing to persist", revision);
            return SaveOutcome::Empty;
        }

        let mut written = self.written.lock().await;
        if revision <= *written {
            debug!("Skipping save of revision {}: revision {} already written", revision, *written);
            return SaveOutcome::Stale;
        }
        match self.store.save(snapshot).await {
            Ok(()) => {
                *written = revision;
                SaveOutcome::Saved
            }
            Err(e) => {
                warn!("Failed to save session revision {}: {}", revision, e);
                SaveOutcome::Failed
            }
        }
    }
}
