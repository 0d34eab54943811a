use async_trait::async_trait;
use log::debug;
use std::path::{ Path, PathBuf };
use tokio::fs;
use tokio::io::AsyncWriteExt;

use super::{ PersistenceError, SnapshotStore };
use crate::models::chat::SessionSnapshot;

pub const SNAPSHOT_FILE: &str = "session.json";

/// One JSON document per data directory, replaced through a temp file and rename.
pub struct FileSnapshotStore {
    dir: PathBuf,
}

impl FileSnapshotStore {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self { dir: dir.as_ref().to_path_buf() }
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(SNAPSHOT_FILE)
    }

    fn temp_path(&self) -> PathBuf {
        self.dir.join(format!("{}.tmp", SNAPSHOT_FILE))
    }
}

#[async_trait]
impl SnapshotStore for FileSnapshotStore {
    async fn save(&self, snapshot: &SessionSnapshot) -> Result<(), PersistenceError> {
        fs::create_dir_all(&self.dir).await?;
        let body = serde_json::to_vec_pretty(snapshot)?;
        let tmp = self.temp_path();
        let mut tmp_file = fs::File::create(&tmp).await?;
        tmp_file.write_all(&body).await?;
        // Flushed to disk before the rename makes it visible.
        tmp_file.sync_all().await?;
        drop(tmp_file);
        fs::rename(&tmp, self.path()).await?;
        debug!(
            "Wrote {} conversations / {} messages to {}",
            snapshot.conversations.len(),
            snapshot.messages.len(),
            self.path().display()
        );
        Ok(())
    }

    async fn load(&self) -> Result<SessionSnapshot, PersistenceError> {
        match fs::read(self.path()).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(SessionSnapshot::default()),
            Err(e) => Err(e.into()),
        }
    }

    fn describe(&self) -> String {
        format!("file {}", self.path().display())
    }
}
