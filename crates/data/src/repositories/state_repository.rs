//! Postgres-backed state store.

use super::{StateStore, StoreError, decode_state, encode_state};
use async_trait::async_trait;
use clmm_cycle_domain::state::PersistentState;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use std::sync::Arc;
use tracing::{debug, warn};

/// Database record for a strategy state document.
#[derive(Debug, Clone)]
pub struct StateRecord {
    /// Strategy identity.
    pub strategy_id: String,
    /// Optimistic-lock version.
    pub version: i64,
    /// State document.
    pub state: serde_json::Value,
    /// Record update timestamp.
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl StateRecord {
    /// Creates a StateRecord from a database row.
    fn from_row(row: &PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            strategy_id: row.try_get("strategy_id")?,
            version: row.try_get("version")?,
            state: row.try_get("state")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

/// State store on the `strategy_states` table.
#[derive(Clone)]
pub struct PostgresStateStore {
    pool: Arc<PgPool>,
}

impl PostgresStateStore {
    /// Creates a new PostgresStateStore.
    #[must_use]
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// Finds the raw record for a strategy.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn find(&self, strategy_id: &str) -> Result<Option<StateRecord>, sqlx::Error> {
        let row = sqlx::query(
            "SELECT strategy_id, version, state, updated_at FROM strategy_states WHERE strategy_id = $1",
        )
        .bind(strategy_id)
        .fetch_optional(self.pool.as_ref())
        .await?;
        row.as_ref().map(StateRecord::from_row).transpose()
    }

    async fn current_version(&self, strategy_id: &str) -> Result<u64, StoreError> {
        Ok(self
            .find(strategy_id)
            .await?
            .map(|r| r.version.max(0) as u64)
            .unwrap_or(0))
    }
}

#[async_trait]
impl StateStore for PostgresStateStore {
    async fn load(&self, strategy_id: &str) -> Result<Option<super::StoredState>, StoreError> {
        let Some(record) = self.find(strategy_id).await? else {
            return Ok(None);
        };
        let state = decode_state(strategy_id, record.state)?;
        Ok(Some(super::StoredState {
            state,
            version: record.version.max(0) as u64,
        }))
    }

    async fn save(
        &self,
        strategy_id: &str,
        state: &PersistentState,
        expected_version: u64,
    ) -> Result<u64, StoreError> {
        let document = encode_state(strategy_id, state)?;
        let next_version = expected_version + 1;

        let result = if expected_version == 0 {
            sqlx::query(
                r#"
                INSERT INTO strategy_states (strategy_id, version, state)
                VALUES ($1, $2, $3)
                ON CONFLICT (strategy_id) DO NOTHING
                "#,
            )
            .bind(strategy_id)
            .bind(next_version as i64)
            .bind(&document)
            .execute(self.pool.as_ref())
            .await?
        } else {
            sqlx::query(
                r#"
                UPDATE strategy_states
                SET version = $2, state = $3, updated_at = NOW()
                WHERE strategy_id = $1 AND version = $4
                "#,
            )
            .bind(strategy_id)
            .bind(next_version as i64)
            .bind(&document)
            .bind(expected_version as i64)
            .execute(self.pool.as_ref())
            .await?
        };

        if result.rows_affected() == 0 {
            let found = self.current_version(strategy_id).await?;
            warn!(
                strategy_id = strategy_id,
                expected = expected_version,
                found = found,
                "State save rejected by version check"
            );
            return Err(StoreError::Conflict {
                strategy_id: strategy_id.to_string(),
                expected: expected_version,
                found,
            });
        }

        debug!(strategy_id = strategy_id, version = next_version, "State saved");
        Ok(next_version)
    }
}
