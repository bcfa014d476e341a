//! Execution collaborator port.
//!
//! The strategy never touches chain clients directly: it hands each action
//! batch to an [`ExecutionClient`] and later asks for the batch's outcome.

mod file;
mod memory;

pub use file::FileOutbox;
pub use memory::MemoryOutbox;

use anyhow::Result;
use async_trait::async_trait;
use clmm_cycle_domain::action::{ActionBatch, ActionOutcome, BatchId};

#[async_trait]
pub trait ExecutionClient: Send + Sync {
    /// Hands a batch over for execution.
    ///
    /// Submitting the same batch id twice must not execute it twice.
    async fn submit(&self, batch: &ActionBatch) -> Result<()>;

    /// Reported outcome of a batch, `None` while nothing has been reported
    /// or when the batch is unknown to the collaborator.
    async fn outcome(&self, batch_id: &BatchId) -> Result<Option<ActionOutcome>>;

    /// Whether the collaborator holds the batch at all.
    async fn is_submitted(&self, batch_id: &BatchId) -> Result<bool>;
}
