//! The persisted strategy document.
//!
//! This is the only durable record of strategy progress. It is loaded and
//! rewritten on every invocation; enum fields are stored by name and an
//! unknown name fails deserialization instead of falling back to a default.

use crate::action::{ActionBatch, BatchId};
use crate::error::DomainError;
use crate::history::{PriceObservation, RebalanceRecord};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Strategy cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StrategyState {
    Initialization,
    SwapToBase,
    ProvideLiquidity,
    MonitorPrice,
    Rebalance,
    /// Reachable only through the external mark-complete operation.
    Completed,
    Teardown,
    /// Absorbing.
    Terminated,
}

impl StrategyState {
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyState::Initialization => "INITIALIZATION",
            StrategyState::SwapToBase => "SWAP_TO_BASE",
            StrategyState::ProvideLiquidity => "PROVIDE_LIQUIDITY",
            StrategyState::MonitorPrice => "MONITOR_PRICE",
            StrategyState::Rebalance => "REBALANCE",
            StrategyState::Completed => "COMPLETED",
            StrategyState::Teardown => "TEARDOWN",
            StrategyState::Terminated => "TERMINATED",
        }
    }
}

impl fmt::Display for StrategyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reserved extension point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubState {
    #[default]
    NoSubstate,
}

/// Whether the machine is about to build a batch or waiting on one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FlowStatus {
    #[default]
    PreparingAction,
    AwaitingResult,
}

/// Identifier of an open liquidity position (the position NFT id).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PositionId(pub String);

impl PositionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for PositionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistentState {
    pub current_state: StrategyState,
    pub current_substate: SubState,
    pub current_flow_status: FlowStatus,
    pub current_actions: Vec<BatchId>,
    /// The batch named by `current_actions`, kept for validation and re-dispatch.
    pub pending_batch: Option<ActionBatch>,
    pub sadflow_counter: u32,
    pub sadflow_actions: Vec<BatchId>,
    pub not_included_counter: u32,
    pub position_id: Option<PositionId>,
    pub retry_count: u32,
    pub rebalance_history: Vec<RebalanceRecord>,
    pub price_history: Vec<PriceObservation>,
    pub last_check_time: Option<DateTime<Utc>>,
    pub last_rebalance_time: Option<DateTime<Utc>>,
    pub last_price: Option<Decimal>,
    #[serde(default)]
    pub completed: bool,
}

impl Default for PersistentState {
    fn default() -> Self {
        Self {
            current_state: StrategyState::Initialization,
            current_substate: SubState::NoSubstate,
            current_flow_status: FlowStatus::PreparingAction,
            current_actions: Vec::new(),
            pending_batch: None,
            sadflow_counter: 0,
            sadflow_actions: Vec::new(),
            not_included_counter: 0,
            position_id: None,
            retry_count: 0,
            rebalance_history: Vec::new(),
            price_history: Vec::new(),
            last_check_time: None,
            last_rebalance_time: None,
            last_price: None,
            completed: false,
        }
    }
}

impl PersistentState {
    /// Checks the flow-status invariant.
    ///
    /// `current_actions` is non-empty exactly when awaiting a result, and the
    /// outstanding batch is the one it names.
    pub fn validate(&self) -> Result<(), DomainError> {
        match self.current_flow_status {
            FlowStatus::PreparingAction => {
                if !self.current_actions.is_empty() {
                    return Err(DomainError::InvalidState(
                        "current_actions must be empty while PREPARING_ACTION".into(),
                    ));
                }
                if self.pending_batch.is_some() {
                    return Err(DomainError::InvalidState(
                        "pending_batch must be empty while PREPARING_ACTION".into(),
                    ));
                }
            }
            FlowStatus::AwaitingResult => {
                let batch = self.pending_batch.as_ref().ok_or_else(|| {
                    DomainError::InvalidState("AWAITING_RESULT without a pending batch".into())
                })?;
                if self.current_actions.as_slice() != [batch.id()] {
                    return Err(DomainError::InvalidState(format!(
                        "current_actions {:?} do not match pending batch {}",
                        self.current_actions,
                        batch.id()
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn is_awaiting(&self) -> bool {
        self.current_flow_status == FlowStatus::AwaitingResult
    }

    pub fn outstanding_batch(&self) -> Option<&ActionBatch> {
        self.pending_batch.as_ref()
    }

    /// Records a freshly emitted batch as outstanding.
    pub fn begin_awaiting(&mut self, batch: ActionBatch) {
        self.current_flow_status = FlowStatus::AwaitingResult;
        self.current_actions = vec![batch.id()];
        self.pending_batch = Some(batch);
        self.sadflow_counter = 0;
        self.not_included_counter = 0;
        self.sadflow_actions.clear();
    }

    /// Swaps the outstanding batch for a recovery batch, keeping the counters.
    pub fn replace_pending(&mut self, batch: ActionBatch) {
        self.current_flow_status = FlowStatus::AwaitingResult;
        self.current_actions = vec![batch.id()];
        self.sadflow_actions.push(batch.id());
        self.pending_batch = Some(batch);
    }

    /// Marks the outstanding batch as resolved.
    pub fn clear_awaiting(&mut self) {
        self.current_flow_status = FlowStatus::PreparingAction;
        self.current_actions.clear();
        self.pending_batch = None;
        self.sadflow_counter = 0;
        self.not_included_counter = 0;
        self.sadflow_actions.clear();
        self.retry_count = 0;
    }

    /// Returns the cursor to the start of a new cycle.
    ///
    /// The open position, if any, is kept: it still exists on-chain.
    pub fn reset_cycle(&mut self) {
        self.clear_awaiting();
        self.current_state = StrategyState::Initialization;
        self.current_substate = SubState::NoSubstate;
        self.rebalance_history.clear();
        self.price_history.clear();
        self.last_check_time = None;
        self.last_rebalance_time = None;
        self.last_price = None;
        self.completed = false;
    }
}
