//! Prelude module for convenient imports.
//!
//! This module re-exports the most commonly used types from the crate.
//!
//! # Example
//!
//! ```rust
//! use clmm_cycle_execution::prelude::*;
//! ```

// Driver
pub use crate::driver::{StateMachine, Transition, TransitionKind};

// Errors
pub use crate::error::{StrategyError, StrategyResult};

// Runner
pub use crate::runner::{StrategyRunner, TickReport};

// Sadflow
pub use crate::sadflow::Recovery;

// Steps
pub use crate::steps::StepContext;

// Trigger
pub use crate::trigger::{
    BoundsTrigger, DeviationTrigger, RebalanceTrigger, TriggerContext, TriggerDecision,
    TriggerEvaluator,
};
