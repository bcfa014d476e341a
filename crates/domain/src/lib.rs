//! Domain model for the concentrated-liquidity cycle strategy.
//!
//! Value objects, the immutable strategy configuration, the persisted
//! state document and the action batches exchanged with the execution
//! collaborator.

/// Chain addresses.
pub mod address;
/// Action batches and their reported outcomes.
pub mod action;
/// Strategy configuration.
pub mod config;
/// Shared enumerations.
pub mod enums;
/// Domain errors.
pub mod error;
/// Diagnostic history records.
pub mod history;
/// Price/tick math.
pub mod math;
/// Persistent strategy state.
pub mod state;
/// Token descriptors and raw amounts.
pub mod token;
/// Price value objects.
pub mod value_objects;

pub use address::Address;
pub use error::{ConfigError, DomainError};
