//! Strategy engine for cyclical concentrated-liquidity management.
//!
//! This crate provides the state machine and everything it drives:
//! - Step functions that turn the cursor into action batches
//! - Rebalance trigger evaluation for the monitoring step
//! - Recovery of failed, cancelled and unconfirmed batches
//! - A pure driver that advances the persisted state by one step
//! - A runner that wires the driver to market data, execution and storage

/// Prelude module for convenient imports.
pub mod prelude;

/// Pure state-machine driver.
pub mod driver;
/// Strategy errors.
pub mod error;
/// Per-invocation orchestration.
pub mod runner;
/// Recovery of unsuccessful batches.
pub mod sadflow;
/// Step functions.
pub mod steps;
/// Rebalance trigger evaluation.
pub mod trigger;

pub use error::{StrategyError, StrategyResult};
