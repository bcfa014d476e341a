//! Collaborator ports and adapters.
//!
//! The strategy core talks to three collaborators, each behind an async
//! trait defined here:
//! - [`MarketDataProvider`]: spot price, position bounds, token balances
//! - [`ExecutionClient`]: dispatches action batches and reports outcomes
//! - [`StateStore`]: all-or-nothing persistence of the strategy document

mod atomic;

/// Execution collaborator port and outbox adapters.
pub mod outbox;
/// Market data port and snapshot adapter.
pub mod providers;
/// State persistence.
pub mod repositories;

pub use outbox::{ExecutionClient, FileOutbox, MemoryOutbox};
pub use providers::{MarketDataProvider, MarketSnapshot, PositionEntry, SnapshotMarketData};
pub use repositories::{
    Database, FileStateStore, MemoryStateStore, PostgresStateStore, StateStore, StoreError,
    StoredState,
};
