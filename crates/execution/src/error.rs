//! Errors surfaced by the strategy engine.
//!
//! Every variant is fatal for the current invocation: the state is not
//! persisted and no batch is submitted. Expected non-events (pause, no
//! trigger, nothing to tear down) are ordinary transitions, not errors.

use clmm_cycle_data::StoreError;
use clmm_cycle_domain::state::StrategyState;
use clmm_cycle_domain::{ConfigError, DomainError};
use thiserror::Error;

/// Result alias for strategy operations.
pub type StrategyResult<T> = Result<T, StrategyError>;

#[derive(Debug, Error)]
pub enum StrategyError {
    /// Configuration could not be loaded or failed validation.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A step could not build its batch from the observed market state.
    #[error("precondition failed in {step}: {reason}")]
    Precondition {
        /// Step that was being dispatched.
        step: StrategyState,
        /// What was observed.
        reason: String,
    },

    /// A SUCCESS outcome did not match what the step requested.
    #[error("outcome validation failed for {step}: {reason}")]
    Validation {
        /// Step that emitted the batch.
        step: StrategyState,
        /// Mismatch description.
        reason: String,
    },

    /// A step kept failing past the configured retry bound.
    #[error("{step} failed {attempts} times, operator intervention required")]
    RetriesExhausted {
        /// Step whose batch kept failing.
        step: StrategyState,
        /// Failed outcomes observed, including the last one.
        attempts: u32,
    },

    /// The caller broke the driver's contract (e.g. an outcome for a batch
    /// that is not outstanding).
    #[error("contract violation: {0}")]
    Contract(String),

    /// Restart requested from a state other than COMPLETED or TERMINATED.
    #[error("cannot restart from {0}")]
    NotRestartable(StrategyState),

    /// Mark-complete requested while a batch is outstanding.
    #[error("cannot mark complete from {state}: {reason}")]
    NotCompletable {
        /// Current cursor.
        state: StrategyState,
        /// Why the request was refused.
        reason: String,
    },

    /// No persisted state exists for the strategy.
    #[error("no persisted state for strategy {0}")]
    MissingState(String),

    /// Market data collaborator failure.
    #[error("market data error: {0}")]
    Market(#[source] anyhow::Error),

    /// Execution collaborator failure.
    #[error("execution client error: {0}")]
    Execution(#[source] anyhow::Error),

    /// Persistence failure, including version conflicts.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Domain invariant violated while building or applying a batch.
    #[error("domain error: {0}")]
    Domain(#[from] DomainError),
}

impl StrategyError {
    /// Builds a precondition error for `step`.
    pub fn precondition(step: StrategyState, reason: impl Into<String>) -> Self {
        Self::Precondition {
            step,
            reason: reason.into(),
        }
    }

    /// Builds a validation error for `step`.
    pub fn validation(step: StrategyState, reason: impl Into<String>) -> Self {
        Self::Validation {
            step,
            reason: reason.into(),
        }
    }
}
