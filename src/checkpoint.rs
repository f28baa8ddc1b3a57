//! Durable fetch progress.
//!
//! A checkpoint holds every description retrieved so far plus the cursor of
//! the next page. The file format is
//!
//! ```json
//! {"issues": ["...", "..."], "nextPageToken": "abc" | null, "savedAt": "..."}
//! ```
//!
//! A checkpoint with no token and at least one issue marks a finished run.
//! Writes go to a sibling temp file that is renamed over the checkpoint, so a
//! crash mid-write leaves the previous checkpoint intact.

use crate::error::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

/// Opaque continuation token of the paginated search
pub type Cursor = Option<String>;

/// Persisted fetch progress
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Descriptions retrieved so far, in server order
    #[serde(default)]
    pub issues: Vec<String>,

    /// Token of the next page; absent at the start and after the last page
    #[serde(rename = "nextPageToken", default)]
    pub next_page_token: Cursor,

    /// When the checkpoint was written
    #[serde(rename = "savedAt", default, skip_serializing_if = "Option::is_none")]
    pub saved_at: Option<DateTime<Utc>>,
}

impl Checkpoint {
    /// True when an earlier run already reached the last page
    pub fn is_complete(&self) -> bool {
        self.next_page_token.is_none() && !self.issues.is_empty()
    }
}

/// Storage for fetch progress
///
/// Implementations need not support concurrent writers: the fetch loop is the
/// only writer and saves between network calls.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Load saved progress; an empty checkpoint if none exists
    async fn load(&self) -> Result<Checkpoint>;

    /// Replace saved progress
    async fn save(&self, issues: &[String], cursor: Option<&str>) -> Result<()>;

    /// Forget saved progress
    async fn clear(&self) -> Result<()>;
}

/// Checkpoint kept in a JSON file
#[derive(Clone, Debug)]
pub struct FileCheckpointStore {
    path: PathBuf,
}

impl FileCheckpointStore {
    /// Store checkpoints at `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Location of the checkpoint file
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "checkpoint".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    fn error(&self, reason: impl std::fmt::Display) -> Error {
        Error::Checkpoint {
            path: self.path.clone(),
            reason: reason.to_string(),
        }
    }
}

#[async_trait]
impl CheckpointStore for FileCheckpointStore {
    async fn load(&self) -> Result<Checkpoint> {
        let raw = match tokio::fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Checkpoint::default());
            }
            Err(e) => return Err(self.error(format!("cannot read: {e}"))),
        };

        let checkpoint: Checkpoint = serde_json::from_slice(&raw)
            .map_err(|e| self.error(format!("malformed checkpoint: {e}")))?;
        tracing::debug!(
            path = %self.path.display(),
            issues = checkpoint.issues.len(),
            has_cursor = checkpoint.next_page_token.is_some(),
            "checkpoint loaded"
        );
        Ok(checkpoint)
    }

    async fn save(&self, issues: &[String], cursor: Option<&str>) -> Result<()> {
        #[derive(Serialize)]
        struct CheckpointRef<'a> {
            issues: &'a [String],
            #[serde(rename = "nextPageToken")]
            next_page_token: Option<&'a str>,
            #[serde(rename = "savedAt")]
            saved_at: DateTime<Utc>,
        }

        let data = serde_json::to_vec(&CheckpointRef {
            issues,
            next_page_token: cursor,
            saved_at: Utc::now(),
        })?;

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| self.error(format!("cannot create directory: {e}")))?;
        }

        let temp = self.temp_path();
        let mut file = tokio::fs::File::create(&temp)
            .await
            .map_err(|e| self.error(format!("cannot create temp file: {e}")))?;
        file.write_all(&data)
            .await
            .map_err(|e| self.error(format!("cannot write temp file: {e}")))?;
        file.sync_all()
            .await
            .map_err(|e| self.error(format!("cannot flush temp file: {e}")))?;
        drop(file);

        tokio::fs::rename(&temp, &self.path)
            .await
            .map_err(|e| self.error(format!("cannot replace checkpoint: {e}")))
    }

    async fn clear(&self) -> Result<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(self.error(format!("cannot remove: {e}"))),
        }
    }
}

/// Checkpoint kept in memory, for embedding without a filesystem
#[derive(Debug, Default)]
pub struct MemoryCheckpointStore {
    state: Mutex<Option<Checkpoint>>,
}

impl MemoryCheckpointStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-seeded with progress
    pub fn with_checkpoint(checkpoint: Checkpoint) -> Self {
        Self {
            state: Mutex::new(Some(checkpoint)),
        }
    }

    /// Current saved progress, if any
    pub async fn snapshot(&self) -> Option<Checkpoint> {
        self.state.lock().await.clone()
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn load(&self) -> Result<Checkpoint> {
        Ok(self.state.lock().await.clone().unwrap_or_default())
    }

    async fn save(&self, issues: &[String], cursor: Option<&str>) -> Result<()> {
        *self.state.lock().await = Some(Checkpoint {
            issues: issues.to_vec(),
            next_page_token: cursor.map(str::to_string),
            saved_at: Some(Utc::now()),
        });
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        *self.state.lock().await = None;
        Ok(())
    }
}
