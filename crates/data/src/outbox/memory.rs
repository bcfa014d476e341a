//! In-process execution collaborator for tests and dry runs.

use super::ExecutionClient;
use anyhow::Result;
use async_trait::async_trait;
use clmm_cycle_domain::action::{ActionBatch, ActionOutcome, BatchId};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Records submitted batches and serves outcomes reported through
/// [`MemoryOutbox::report`].
#[derive(Debug, Default)]
pub struct MemoryOutbox {
    submitted: RwLock<Vec<ActionBatch>>,
    outcomes: RwLock<HashMap<BatchId, ActionOutcome>>,
}

impl MemoryOutbox {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes an outcome visible to the next [`ExecutionClient::outcome`] call.
    pub async fn report(&self, outcome: ActionOutcome) {
        self.outcomes.write().await.insert(outcome.batch_id, outcome);
    }

    /// All distinct batches submitted so far, in submission order.
    pub async fn submitted(&self) -> Vec<ActionBatch> {
        self.submitted.read().await.clone()
    }

    pub async fn last_submitted(&self) -> Option<ActionBatch> {
        self.submitted.read().await.last().cloned()
    }
}

#[async_trait]
impl ExecutionClient for MemoryOutbox {
    async fn submit(&self, batch: &ActionBatch) -> Result<()> {
        let mut submitted = self.submitted.write().await;
        if !submitted.iter().any(|b| b.id() == batch.id()) {
            submitted.push(batch.clone());
        }
        Ok(())
    }

    async fn outcome(&self, batch_id: &BatchId) -> Result<Option<ActionOutcome>> {
        Ok(self.outcomes.read().await.get(batch_id).cloned())
    }

    async fn is_submitted(&self, batch_id: &BatchId) -> Result<bool> {
        Ok(self
            .submitted
            .read()
            .await
            .iter()
            .any(|b| b.id() == *batch_id))
    }
}
