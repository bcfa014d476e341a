//! In-process state store, used by tests and dry runs.

use super::{StateStore, StoreError, StoredState, decode_state, encode_state};
use async_trait::async_trait;
use clmm_cycle_domain::state::PersistentState;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// [`StateStore`] holding serialized documents in memory.
///
/// Documents go through the same JSON encoding as the durable stores, so a
/// state that would not survive a real save does not survive here either.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    documents: RwLock<HashMap<String, (u64, serde_json::Value)>>,
}

impl MemoryStateStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Version currently stored for a strategy, 0 if none.
    pub async fn version(&self, strategy_id: &str) -> u64 {
        self.documents
            .read()
            .await
            .get(strategy_id)
            .map_or(0, |(version, _)| *version)
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn load(&self, strategy_id: &str) -> Result<Option<StoredState>, StoreError> {
        let documents = self.documents.read().await;
        let Some((version, value)) = documents.get(strategy_id) else {
            return Ok(None);
        };
        let state = decode_state(strategy_id, value.clone())?;
        Ok(Some(StoredState {
            state,
            version: *version,
        }))
    }

    async fn save(
        &self,
        strategy_id: &str,
        state: &PersistentState,
        expected_version: u64,
    ) -> Result<u64, StoreError> {
        let value = encode_state(strategy_id, state)?;
        let mut documents = self.documents.write().await;
        let found = documents.get(strategy_id).map_or(0, |(v, _)| *v);
        if found != expected_version {
            return Err(StoreError::Conflict {
                strategy_id: strategy_id.to_string(),
                expected: expected_version,
                found,
            });
        }
        let next = expected_version + 1;
        documents.insert(strategy_id.to_string(), (next, value));
        Ok(next)
    }
}
