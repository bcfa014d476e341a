//! Step functions.
//!
//! Each step reads the market through a [`StepContext`], builds the action
//! batch for its position in the cycle, and validates the receipts of a
//! successful outcome for the batch it emitted. Steps never persist anything
//! and never advance the cursor themselves; the driver does both.

pub mod initialization;
pub mod provide_liquidity;
pub mod rebalance;
pub mod swap;
pub mod teardown;

use crate::error::{StrategyError, StrategyResult};
use chrono::{DateTime, Utc};
use clmm_cycle_data::MarketDataProvider;
use clmm_cycle_domain::Address;
use clmm_cycle_domain::action::{Action, ActionBatch, ActionOutcome};
use clmm_cycle_domain::config::StrategyConfig;
use clmm_cycle_domain::state::{PersistentState, PositionId, StrategyState};
use clmm_cycle_domain::token::TokenAmount;
use clmm_cycle_domain::value_objects::{Price, PriceRange};
use rust_decimal::Decimal;

/// Read-only inputs shared by every step of one invocation.
#[derive(Clone, Copy)]
pub struct StepContext<'a> {
    /// Deployment configuration.
    pub config: &'a StrategyConfig,
    /// Market and position data.
    pub market: &'a dyn MarketDataProvider,
    /// Invocation time, used for batch and history timestamps.
    pub now: DateTime<Utc>,
}

impl<'a> StepContext<'a> {
    /// Creates a new step context.
    pub fn new(
        config: &'a StrategyConfig,
        market: &'a dyn MarketDataProvider,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            config,
            market,
            now,
        }
    }

    /// Wallet balance of `token`.
    ///
    /// # Errors
    /// Returns [`StrategyError::Market`] if the provider fails.
    pub async fn balance(&self, token: &Address) -> StrategyResult<TokenAmount> {
        self.market
            .token_balance(token, &self.config.wallet_address)
            .await
            .map_err(StrategyError::Market)
    }

    /// Spot price of the configured pool.
    ///
    /// # Errors
    /// Returns [`StrategyError::Market`] if the provider fails.
    pub async fn spot_price(&self) -> StrategyResult<Price> {
        self.market
            .spot_price(&self.config.pool_address)
            .await
            .map_err(StrategyError::Market)
    }

    /// Price bounds of an open position.
    ///
    /// # Errors
    /// Returns [`StrategyError::Market`] if the provider fails.
    pub async fn position_bounds(&self, position: &PositionId) -> StrategyResult<PriceRange> {
        self.market
            .position_bounds(position)
            .await
            .map_err(StrategyError::Market)
    }

    /// Slippage tolerance for the current attempt of a step.
    pub fn slippage(&self, state: &PersistentState) -> Decimal {
        self.config.slippage_for_attempt(state.retry_count)
    }

    /// Wraps `actions` into a batch stamped with this invocation's time.
    ///
    /// # Errors
    /// Returns [`StrategyError::Domain`] if `actions` is empty.
    pub fn batch(&self, step: StrategyState, actions: Vec<Action>) -> StrategyResult<ActionBatch> {
        Ok(ActionBatch::new(
            step,
            self.config.protocol,
            actions,
            self.now,
        )?)
    }
}

/// Cursor value once `step` has emitted its batch (or had nothing to emit).
pub fn successor(step: StrategyState) -> StrategyState {
    match step {
        StrategyState::Initialization => StrategyState::SwapToBase,
        StrategyState::SwapToBase => StrategyState::ProvideLiquidity,
        StrategyState::ProvideLiquidity => StrategyState::MonitorPrice,
        StrategyState::Rebalance => StrategyState::MonitorPrice,
        StrategyState::Teardown => StrategyState::Terminated,
        StrategyState::MonitorPrice => StrategyState::MonitorPrice,
        StrategyState::Completed => StrategyState::Completed,
        StrategyState::Terminated => StrategyState::Terminated,
    }
}

/// Builds the batch for `step`.
///
/// `None` means the step legitimately has nothing to do (teardown with no
/// open position).
///
/// # Errors
/// Fails on precondition violations and market errors, and with
/// [`StrategyError::Contract`] for steps that never emit batches.
pub async fn emit(
    step: StrategyState,
    ctx: &StepContext<'_>,
    state: &mut PersistentState,
) -> StrategyResult<Option<ActionBatch>> {
    match step {
        StrategyState::Initialization => initialization::emit(ctx, state).await.map(Some),
        StrategyState::SwapToBase => swap::emit(ctx, state).await.map(Some),
        StrategyState::ProvideLiquidity => provide_liquidity::emit(ctx, state).await.map(Some),
        StrategyState::Rebalance => rebalance::emit(ctx, state).await.map(Some),
        StrategyState::Teardown => teardown::emit(ctx, state),
        StrategyState::MonitorPrice | StrategyState::Completed | StrategyState::Terminated => Err(
            StrategyError::Contract(format!("{step} does not emit action batches")),
        ),
    }
}

/// Validates a SUCCESS outcome against the batch that produced it and
/// applies its receipts to the state.
///
/// # Errors
/// Returns [`StrategyError::Validation`] when the receipts do not match the
/// request.
pub fn apply_success(
    batch: &ActionBatch,
    outcome: &ActionOutcome,
    state: &mut PersistentState,
    now: DateTime<Utc>,
) -> StrategyResult<()> {
    let receipts = outcome.receipts.as_slice();
    match batch.step() {
        StrategyState::Initialization => initialization::apply_outcome(batch, receipts),
        StrategyState::SwapToBase => swap::apply_outcome(batch, receipts),
        StrategyState::ProvideLiquidity => {
            provide_liquidity::apply_outcome(batch, receipts, state, now)
        }
        StrategyState::Rebalance => rebalance::apply_outcome(batch, receipts, state, now),
        StrategyState::Teardown => teardown::apply_outcome(batch, receipts, state),
        step @ (StrategyState::MonitorPrice | StrategyState::Completed | StrategyState::Terminated) => {
            Err(StrategyError::Contract(format!(
                "batch {} claims to come from {step}, which never emits",
                batch.id()
            )))
        }
    }
}
