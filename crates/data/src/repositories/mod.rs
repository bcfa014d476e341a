//! State persistence.
//!
//! Every store keeps one JSON document per strategy together with a
//! monotonically increasing version. Writers pass the version they loaded;
//! a mismatch means another invocation got there first and the save is
//! rejected, so two concurrent ticks can never both advance the cursor.

mod file_store;
mod memory_store;
mod state_repository;

pub use file_store::FileStateStore;
pub use memory_store::MemoryStateStore;
pub use state_repository::{PostgresStateStore, StateRecord};

use async_trait::async_trait;
use clmm_cycle_domain::DomainError;
use clmm_cycle_domain::state::PersistentState;
use sqlx::PgPool;
use std::sync::Arc;
use thiserror::Error;

/// Errors raised by [`StateStore`] implementations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("state store i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("corrupt state document for {strategy_id}: {source}")]
    Corrupt {
        strategy_id: String,
        source: serde_json::Error,
    },
    #[error("invalid state for {strategy_id}: {source}")]
    Invalid {
        strategy_id: String,
        source: DomainError,
    },
    #[error("version conflict for {strategy_id}: expected {expected}, found {found}")]
    Conflict {
        strategy_id: String,
        expected: u64,
        found: u64,
    },
    #[error("state for {0} is locked by another invocation")]
    Locked(String),
    #[error("invalid strategy id {0:?}")]
    InvalidId(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// A loaded state document and the version it was stored under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredState {
    pub state: PersistentState,
    pub version: u64,
}

/// All-or-nothing persistence of the strategy document.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Loads the document, `None` if the strategy has never been saved.
    ///
    /// # Errors
    /// Fails on unreadable, unparseable or invariant-violating documents;
    /// nothing is default-substituted.
    async fn load(&self, strategy_id: &str) -> Result<Option<StoredState>, StoreError>;

    /// Saves the document if the stored version still equals
    /// `expected_version` (0 for a first save) and returns the new version.
    async fn save(
        &self,
        strategy_id: &str,
        state: &PersistentState,
        expected_version: u64,
    ) -> Result<u64, StoreError>;
}

/// Parses a stored document and checks its invariants.
pub(crate) fn decode_state(
    strategy_id: &str,
    value: serde_json::Value,
) -> Result<PersistentState, StoreError> {
    let state: PersistentState =
        serde_json::from_value(value).map_err(|source| StoreError::Corrupt {
            strategy_id: strategy_id.to_string(),
            source,
        })?;
    check_state(strategy_id, &state)?;
    Ok(state)
}

pub(crate) fn check_state(strategy_id: &str, state: &PersistentState) -> Result<(), StoreError> {
    state.validate().map_err(|source| StoreError::Invalid {
        strategy_id: strategy_id.to_string(),
        source,
    })
}

pub(crate) fn encode_state(
    strategy_id: &str,
    state: &PersistentState,
) -> Result<serde_json::Value, StoreError> {
    check_state(strategy_id, state)?;
    serde_json::to_value(state).map_err(|source| StoreError::Corrupt {
        strategy_id: strategy_id.to_string(),
        source,
    })
}

/// Database connection wrapper for repositories.
#[derive(Clone)]
pub struct Database {
    pool: Arc<PgPool>,
}

impl Database {
    /// Creates a new Database wrapper from a connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Creates a new database connection from a connection string.
    ///
    /// # Errors
    /// Returns an error if the connection fails.
    pub async fn connect(database_url: &str) -> Result<Self, sqlx::Error> {
        let pool = PgPool::connect(database_url).await?;
        Ok(Self::new(pool))
    }

    /// Returns a reference to the connection pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Creates a PostgresStateStore instance.
    #[must_use]
    pub fn states(&self) -> PostgresStateStore {
        PostgresStateStore::new(self.pool.clone())
    }

    /// Runs database migrations.
    ///
    /// # Errors
    /// Returns an error if migrations fail.
    pub async fn migrate(&self) -> Result<(), sqlx::Error> {
        sqlx::query(include_str!("../../migrations/001_strategy_state.sql"))
            .execute(self.pool.as_ref())
            .await?;
        Ok(())
    }
}
