//! Directory-based outbox shared with an external executor process.
//!
//! - `pending/<batch_id>.json`: batches waiting to be executed; the executor
//!   may remove a file once it has picked the batch up
//! - `submitted/<batch_id>`: handover marker, never removed by the executor
//! - `outcomes/<batch_id>.json`: outcomes written back by the executor

use super::ExecutionClient;
use crate::atomic::write_atomic;
use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use chrono::Utc;
use clmm_cycle_domain::action::{ActionBatch, ActionOutcome, BatchId};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct FileOutbox {
    root: PathBuf,
}

impl FileOutbox {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn pending_path(&self, batch_id: &BatchId) -> PathBuf {
        self.root.join("pending").join(format!("{batch_id}.json"))
    }

    fn marker_path(&self, batch_id: &BatchId) -> PathBuf {
        self.root.join("submitted").join(batch_id.to_string())
    }

    fn outcome_path(&self, batch_id: &BatchId) -> PathBuf {
        self.root.join("outcomes").join(format!("{batch_id}.json"))
    }
}

#[async_trait]
impl ExecutionClient for FileOutbox {
    async fn submit(&self, batch: &ActionBatch) -> Result<()> {
        let marker = self.marker_path(&batch.id());
        if tokio::fs::try_exists(&marker).await? {
            debug!(batch_id = %batch.id(), "Batch already handed over");
            return Ok(());
        }
        let path = self.pending_path(&batch.id());
        if !tokio::fs::try_exists(&path).await? {
            let bytes = serde_json::to_vec_pretty(batch)?;
            write_atomic(&path, &bytes)
                .await
                .with_context(|| format!("failed to write batch to {}", path.display()))?;
        }
        write_atomic(&marker, Utc::now().to_rfc3339().as_bytes())
            .await
            .with_context(|| format!("failed to write marker {}", marker.display()))?;
        info!(
            batch_id = %batch.id(),
            step = %batch.step(),
            actions = batch.actions().len(),
            "Batch written to outbox"
        );
        Ok(())
    }

    async fn outcome(&self, batch_id: &BatchId) -> Result<Option<ActionOutcome>> {
        let path = self.outcome_path(batch_id);
        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e).with_context(|| format!("failed to read {}", path.display())),
        };
        let outcome: ActionOutcome = serde_json::from_str(&raw)
            .with_context(|| format!("malformed outcome in {}", path.display()))?;
        if outcome.batch_id != *batch_id {
            bail!(
                "outcome file {} reports batch {}",
                path.display(),
                outcome.batch_id
            );
        }
        Ok(Some(outcome))
    }

    async fn is_submitted(&self, batch_id: &BatchId) -> Result<bool> {
        Ok(tokio::fs::try_exists(self.marker_path(batch_id)).await?)
    }
}
