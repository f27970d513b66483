use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{DubberError, Result};
use crate::social::compare_status_ids;

/// Lifecycle of a mention as far as dedupe is concerned
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarkerStatus {
    /// Dub work has started; a crash leaves the mention here
    Processing,
    Completed,
    Failed,
    /// The bot's own post; never dubbed
    Skipped,
}

impl fmt::Display for MarkerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessedMarker {
    pub mention_id: String,
    pub status: MarkerStatus,
    pub timestamp: DateTime<Utc>,
}

/// On-disk layout
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StateSnapshot {
    #[serde(default)]
    pub cursor: Option<String>,
    #[serde(default)]
    pub processed: BTreeMap<String, ProcessedMarker>,
}

/// Dedupe markers plus the mention cursor, persisted as JSON after every change
pub struct StateStore {
    path: Option<PathBuf>,
    inner: Mutex<StateSnapshot>,
}

impl StateStore {
    /// Load from `path`; a missing file starts empty
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let snapshot = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            if content.trim().is_empty() {
                StateSnapshot::default()
            } else {
                serde_json::from_str(&content).map_err(|e| {
                    DubberError::State(format!("corrupt state file {}: {}", path.display(), e))
                })?
            }
        } else {
            StateSnapshot::default()
        };

        debug!(
            "Loaded state from {} ({} markers, cursor {:?})",
            path.display(),
            snapshot.processed.len(),
            snapshot.cursor
        );

        Ok(Self {
            path: Some(path),
            inner: Mutex::new(snapshot),
        })
    }

    /// Store that never touches disk
    pub fn in_memory() -> Self {
        Self {
            path: None,
            inner: Mutex::new(StateSnapshot::default()),
        }
    }

    pub async fn is_processed(&self, mention_id: &str) -> bool {
        self.inner.lock().await.processed.contains_key(mention_id)
    }

    pub async fn marker(&self, mention_id: &str) -> Option<ProcessedMarker> {
        self.inner.lock().await.processed.get(mention_id).cloned()
    }

    /// Record or update the marker for `mention_id`
    pub async fn mark(&self, mention_id: &str, status: MarkerStatus) -> Result<()> {
        let mut state = self.inner.lock().await;
        state.processed.insert(
            mention_id.to_string(),
            ProcessedMarker {
                mention_id: mention_id.to_string(),
                status,
                timestamp: Utc::now(),
            },
        );
        self.persist(&state)
    }

    /// Atomically check-and-mark. Returns false when a marker already exists.
    pub async fn try_claim(&self, mention_id: &str) -> Result<bool> {
        let mut state = self.inner.lock().await;
        if state.processed.contains_key(mention_id) {
            return Ok(false);
        }
        state.processed.insert(
            mention_id.to_string(),
            ProcessedMarker {
                mention_id: mention_id.to_string(),
                status: MarkerStatus::Processing,
                timestamp: Utc::now(),
            },
        );
        self.persist(&state)?;
        Ok(true)
    }

    pub async fn cursor(&self) -> Option<String> {
        self.inner.lock().await.cursor.clone()
    }

    /// Move the cursor forward to `mention_id`. Older ids are ignored.
    pub async fn advance_cursor(&self, mention_id: &str) -> Result<bool> {
        let mut state = self.inner.lock().await;
        let newer = match &state.cursor {
            Some(current) => compare_status_ids(mention_id, current) == Ordering::Greater,
            None => true,
        };
        if !newer {
            return Ok(false);
        }

        state.cursor = Some(mention_id.to_string());
        self.persist(&state)?;
        info!("Mention cursor advanced to {}", mention_id);
        Ok(true)
    }

    pub async fn snapshot(&self) -> StateSnapshot {
        self.inner.lock().await.clone()
    }

    pub async fn clear(&self) -> Result<()> {
        let mut state = self.inner.lock().await;
        *state = StateSnapshot::default();
        self.persist(&state)
    }

    fn persist(&self, state: &StateSnapshot) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        // Write-then-rename so a crash never leaves a truncated file
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_string_pretty(state)?)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_markers_survive_reload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("state.json");

        let store = StateStore::load(&path).unwrap();
        store.mark("100", MarkerStatus::Processing).await.unwrap();
        store.mark("100", MarkerStatus::Completed).await.unwrap();
        store.advance_cursor("100").await.unwrap();

        let reloaded = StateStore::load(&path).unwrap();
        assert!(reloaded.is_processed("100").await);
        assert!(!reloaded.is_processed("101").await);
        assert_eq!(reloaded.marker("100").await.unwrap().status, MarkerStatus::Completed);
        assert_eq!(reloaded.cursor().await.as_deref(), Some("100"));
    }

    #[tokio::test]
    async fn test_cursor_never_rewinds() {
        let store = StateStore::in_memory();

        assert!(store.advance_cursor("1000").await.unwrap());
        assert!(!store.advance_cursor("999").await.unwrap());
        assert!(!store.advance_cursor("1000").await.unwrap());
        assert!(store.advance_cursor("1001").await.unwrap());
        assert_eq!(store.cursor().await.as_deref(), Some("1001"));
    }

    #[tokio::test]
    async fn test_try_claim_is_exclusive() {
        let store = StateStore::in_memory();

        assert!(store.try_claim("7").await.unwrap());
        assert!(!store.try_claim("7").await.unwrap());
        assert_eq!(store.marker("7").await.unwrap().status, MarkerStatus::Processing);
    }

    #[tokio::test]
    async fn test_clear_resets_everything() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");
        let store = StateStore::load(&path).unwrap();
        store.mark("1", MarkerStatus::Failed).await.unwrap();
        store.advance_cursor("1").await.unwrap();

        store.clear().await.unwrap();

        let reloaded = StateStore::load(&path).unwrap();
        assert_eq!(reloaded.cursor().await, None);
        assert!(reloaded.snapshot().await.processed.is_empty());
    }

    #[test]
    fn test_corrupt_file_is_state_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, "{not json").unwrap();

        assert!(matches!(StateStore::load(&path), Err(DubberError::State(_))));
    }
}
