//! Action batches emitted by the step functions and the outcomes the
//! execution collaborator reports back for them.

use crate::address::Address;
use crate::enums::Protocol;
use crate::error::DomainError;
use crate::state::{PositionId, StrategyState};
use crate::token::{Token, TokenAmount};
use crate::value_objects::Price;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Correlation identifier shared by a batch and its outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BatchId(pub Uuid);

impl BatchId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for BatchId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApproveParams {
    pub token: Address,
    pub spender: Address,
    pub owner: Address,
    pub amount: TokenAmount,
}

/// Exact-input swap of `amount` of `token_in`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapParams {
    pub token_in: Token,
    pub token_out: Token,
    pub fee_tier: u32,
    pub recipient: Address,
    pub amount: TokenAmount,
    pub slippage: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenPositionParams {
    pub token0: Token,
    pub token1: Token,
    pub fee_tier: u32,
    pub price_lower: Price,
    pub price_upper: Price,
    pub amount0_desired: TokenAmount,
    pub amount1_desired: TokenAmount,
    pub recipient: Address,
    pub slippage: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClosePositionParams {
    pub position_id: PositionId,
    pub recipient: Address,
    pub token0: Address,
    pub token1: Address,
    pub slippage: Decimal,
}

/// A single external operation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    Approve(ApproveParams),
    Swap(SwapParams),
    #[serde(rename = "OPEN_LP_POSITION")]
    OpenPosition(OpenPositionParams),
    #[serde(rename = "CLOSE_LP_POSITION")]
    ClosePosition(ClosePositionParams),
}

impl Action {
    pub fn name(&self) -> &'static str {
        match self {
            Action::Approve(_) => "APPROVE",
            Action::Swap(_) => "SWAP",
            Action::OpenPosition(_) => "OPEN_LP_POSITION",
            Action::ClosePosition(_) => "CLOSE_LP_POSITION",
        }
    }
}

/// Ordered, immutable set of actions dispatched and resolved as a unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionBatch {
    id: BatchId,
    step: StrategyState,
    protocol: Protocol,
    created_at: DateTime<Utc>,
    actions: Vec<Action>,
}

impl ActionBatch {
    /// Builds a batch with a fresh identifier.
    ///
    /// # Errors
    /// Returns [`DomainError::EmptyBatch`] when `actions` is empty.
    pub fn new(
        step: StrategyState,
        protocol: Protocol,
        actions: Vec<Action>,
        created_at: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        if actions.is_empty() {
            return Err(DomainError::EmptyBatch);
        }
        Ok(Self {
            id: BatchId::new(),
            step,
            protocol,
            created_at,
            actions,
        })
    }

    pub fn id(&self) -> BatchId {
        self.id
    }

    /// The step that emitted this batch.
    pub fn step(&self) -> StrategyState {
        self.step
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    pub fn swap(&self) -> Option<&SwapParams> {
        self.actions.iter().find_map(|a| match a {
            Action::Swap(p) => Some(p),
            _ => None,
        })
    }

    pub fn close_position(&self) -> Option<&ClosePositionParams> {
        self.actions.iter().find_map(|a| match a {
            Action::ClosePosition(p) => Some(p),
            _ => None,
        })
    }

    pub fn open_position(&self) -> Option<&OpenPositionParams> {
        self.actions.iter().find_map(|a| match a {
            Action::OpenPosition(p) => Some(p),
            _ => None,
        })
    }
}

/// Overall status of a dispatched batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStatus {
    Success,
    Failed,
    Cancelled,
    /// Submitted but not yet observed as finalized.
    NotIncluded,
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExecutionStatus::Success => "SUCCESS",
            ExecutionStatus::Failed => "FAILED",
            ExecutionStatus::Cancelled => "CANCELLED",
            ExecutionStatus::NotIncluded => "NOT_INCLUDED",
        };
        f.write_str(s)
    }
}

/// Per-action execution receipt attached to a successful outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionReceipt {
    Approve {
        token: Address,
        amount: TokenAmount,
    },
    Swap {
        token_in_symbol: String,
        token_out_symbol: String,
        amount_in: TokenAmount,
        amount_out: TokenAmount,
    },
    #[serde(rename = "OPEN_LP_POSITION")]
    PositionOpened {
        position_id: PositionId,
        amount0: TokenAmount,
        amount1: TokenAmount,
    },
    #[serde(rename = "CLOSE_LP_POSITION")]
    PositionClosed {
        position_id: PositionId,
        amount0: TokenAmount,
        amount1: TokenAmount,
    },
}

/// Result of a batch as reported by the execution collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionOutcome {
    pub batch_id: BatchId,
    pub status: ExecutionStatus,
    #[serde(default)]
    pub receipts: Vec<ActionReceipt>,
}

impl ActionOutcome {
    pub fn success(batch_id: BatchId, receipts: Vec<ActionReceipt>) -> Self {
        Self {
            batch_id,
            status: ExecutionStatus::Success,
            receipts,
        }
    }

    pub fn with_status(batch_id: BatchId, status: ExecutionStatus) -> Self {
        Self {
            batch_id,
            status,
            receipts: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn addr(last: &str) -> Address {
        Address::parse(&format!("0x{:0>40}", last)).unwrap()
    }

    #[test]
    fn test_empty_batch_rejected() {
        let err = ActionBatch::new(
            StrategyState::Initialization,
            Protocol::UniswapV3,
            vec![],
            Utc::now(),
        )
        .unwrap_err();
        assert_eq!(err, DomainError::EmptyBatch);
    }

    #[test]
    fn test_batch_serializes_action_tags() {
        let batch = ActionBatch::new(
            StrategyState::Teardown,
            Protocol::UniswapV3,
            vec![Action::ClosePosition(ClosePositionParams {
                position_id: PositionId::new("4411"),
                recipient: addr("a1"),
                token0: addr("06"),
                token1: addr("13"),
                slippage: dec!(0.005),
            })],
            Utc::now(),
        )
        .unwrap();

        let json = serde_json::to_value(&batch).unwrap();
        assert_eq!(json["step"], "TEARDOWN");
        assert_eq!(json["protocol"], "UNISWAP_V3");
        assert_eq!(json["actions"][0]["type"], "CLOSE_LP_POSITION");
        assert_eq!(json["actions"][0]["position_id"], "4411");
        assert_eq!(json["id"], batch.id().to_string());
    }

    #[test]
    fn test_outcome_parses_collaborator_report() {
        let id = BatchId::new();
        let raw = format!(
            r#"{{
                "batch_id": "{id}",
                "status": "SUCCESS",
                "receipts": [{{
                    "type": "SWAP",
                    "token_in_symbol": "USDC",
                    "token_out_symbol": "WETH",
                    "amount_in": "500000000",
                    "amount_out": "250000000000000000"
                }}]
            }}"#
        );
        let outcome: ActionOutcome = serde_json::from_str(&raw).unwrap();
        assert_eq!(outcome.batch_id, id);
        assert_eq!(outcome.status, ExecutionStatus::Success);
        assert!(matches!(outcome.receipts[0], ActionReceipt::Swap { .. }));
    }

    #[test]
    fn test_outcome_without_receipts() {
        let raw = format!(r#"{{"batch_id": "{}", "status": "NOT_INCLUDED"}}"#, BatchId::new());
        let outcome: ActionOutcome = serde_json::from_str(&raw).unwrap();
        assert_eq!(outcome.status, ExecutionStatus::NotIncluded);
        assert!(outcome.receipts.is_empty());
    }
}
