//! JSON-file state store.
//!
//! Layout under the root directory:
//! - `<strategy_id>.json`: the current document
//! - `<strategy_id>.lock`: held for the duration of a save
//!
//! Saves write a sibling temp file and rename it over the document, so a
//! crash leaves either the previous or the new document on disk.

use super::{StateStore, StoreError, StoredState, decode_state, encode_state};
use crate::atomic::write_atomic;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use clmm_cycle_domain::DomainError;
use clmm_cycle_domain::state::PersistentState;
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{debug, warn};

/// Default age after which a lock file is considered abandoned.
const DEFAULT_STALE_LOCK: Duration = Duration::from_secs(300);

#[derive(Debug, Serialize, Deserialize)]
struct StateDocument {
    strategy_id: String,
    version: u64,
    updated_at: DateTime<Utc>,
    state: serde_json::Value,
}

/// [`StateStore`] keeping one JSON document per strategy in a directory.
#[derive(Debug, Clone)]
pub struct FileStateStore {
    root: PathBuf,
    stale_lock_after: Duration,
}

impl FileStateStore {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            stale_lock_after: DEFAULT_STALE_LOCK,
        }
    }

    /// Overrides the age after which a leftover lock file is broken.
    #[must_use]
    pub fn with_stale_lock_after(mut self, after: Duration) -> Self {
        self.stale_lock_after = after;
        self
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn document_path(&self, strategy_id: &str) -> Result<PathBuf, StoreError> {
        Ok(self.root.join(format!("{}.json", checked_id(strategy_id)?)))
    }

    fn lock_path(&self, strategy_id: &str) -> Result<PathBuf, StoreError> {
        Ok(self.root.join(format!("{}.lock", checked_id(strategy_id)?)))
    }

    async fn read_document(&self, strategy_id: &str) -> Result<Option<StateDocument>, StoreError> {
        let path = self.document_path(strategy_id)?;
        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let document: StateDocument =
            serde_json::from_str(&raw).map_err(|source| StoreError::Corrupt {
                strategy_id: strategy_id.to_string(),
                source,
            })?;
        if document.strategy_id != strategy_id {
            return Err(StoreError::Invalid {
                strategy_id: strategy_id.to_string(),
                source: DomainError::InvalidState(format!(
                    "{} holds the document of strategy {}",
                    path.display(),
                    document.strategy_id
                )),
            });
        }
        Ok(Some(document))
    }

    async fn acquire_lock(&self, strategy_id: &str) -> Result<LockGuard, StoreError> {
        tokio::fs::create_dir_all(&self.root).await?;
        let path = self.lock_path(strategy_id)?;

        for attempt in 0..2 {
            match tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(_) => return Ok(LockGuard { path }),
                Err(e) if e.kind() == ErrorKind::AlreadyExists && attempt == 0 => {
                    if !self.is_stale(&path).await {
                        break;
                    }
                    warn!(
                        strategy_id = strategy_id,
                        path = %path.display(),
                        "Breaking stale state lock"
                    );
                    match tokio::fs::remove_file(&path).await {
                        Ok(()) => {}
                        Err(e) if e.kind() == ErrorKind::NotFound => {}
                        Err(e) => return Err(e.into()),
                    }
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => break,
                Err(e) => return Err(e.into()),
            }
        }
        Err(StoreError::Locked(strategy_id.to_string()))
    }

    async fn is_stale(&self, path: &Path) -> bool {
        let Ok(metadata) = tokio::fs::metadata(path).await else {
            return true;
        };
        metadata
            .modified()
            .ok()
            .and_then(|modified| SystemTime::now().duration_since(modified).ok())
            .is_some_and(|age| age > self.stale_lock_after)
    }
}

/// Removes the lock file when dropped.
struct LockGuard {
    path: PathBuf,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            warn!(path = %self.path.display(), error = %e, "Failed to release state lock");
        }
    }
}

fn checked_id(strategy_id: &str) -> Result<&str, StoreError> {
    let valid = !strategy_id.is_empty()
        && strategy_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        && !strategy_id.starts_with('.');
    if valid {
        Ok(strategy_id)
    } else {
        Err(StoreError::InvalidId(strategy_id.to_string()))
    }
}

#[async_trait]
impl StateStore for FileStateStore {
    async fn load(&self, strategy_id: &str) -> Result<Option<StoredState>, StoreError> {
        let Some(document) = self.read_document(strategy_id).await? else {
            return Ok(None);
        };
        let state = decode_state(strategy_id, document.state)?;
        Ok(Some(StoredState {
            state,
            version: document.version,
        }))
    }

    async fn save(
        &self,
        strategy_id: &str,
        state: &PersistentState,
        expected_version: u64,
    ) -> Result<u64, StoreError> {
        let value = encode_state(strategy_id, state)?;
        let _lock = self.acquire_lock(strategy_id).await?;

        let found = self
            .read_document(strategy_id)
            .await?
            .map_or(0, |d| d.version);
        if found != expected_version {
            return Err(StoreError::Conflict {
                strategy_id: strategy_id.to_string(),
                expected: expected_version,
                found,
            });
        }

        let document = StateDocument {
            strategy_id: strategy_id.to_string(),
            version: expected_version + 1,
            updated_at: Utc::now(),
            state: value,
        };
        let bytes = serde_json::to_vec_pretty(&document).map_err(|source| StoreError::Corrupt {
            strategy_id: strategy_id.to_string(),
            source,
        })?;
        write_atomic(&self.document_path(strategy_id)?, &bytes).await?;

        debug!(
            strategy_id = strategy_id,
            version = document.version,
            "State document written"
        );
        Ok(document.version)
    }
}
