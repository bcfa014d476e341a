//! SWAP_TO_BASE: sell half of the quote balance for the base token.

use super::StepContext;
use crate::error::{StrategyError, StrategyResult};
use clmm_cycle_domain::action::{Action, ActionBatch, ActionReceipt, SwapParams};
use clmm_cycle_domain::state::{PersistentState, StrategyState};
use tracing::info;

const STEP: StrategyState = StrategyState::SwapToBase;

/// Emits a swap of half the quote balance into the base token.
///
/// # Errors
/// Returns [`StrategyError::Precondition`] when there is nothing to swap.
pub async fn emit(ctx: &StepContext<'_>, state: &mut PersistentState) -> StrategyResult<ActionBatch> {
    let config = ctx.config;
    let balance = ctx.balance(&config.quote_token.address).await?;
    let amount = balance.half();
    if amount.is_zero() {
        return Err(StrategyError::precondition(
            STEP,
            format!("{} balance {} is too small to swap", config.quote_token.symbol, balance),
        ));
    }

    let slippage = ctx.slippage(state);
    info!(
        token_in = %config.quote_token.symbol,
        token_out = %config.base_token.symbol,
        amount = %amount,
        slippage = %slippage,
        attempt = state.retry_count,
        "Swapping half of quote balance"
    );

    ctx.batch(
        STEP,
        vec![Action::Swap(SwapParams {
            token_in: config.quote_token.clone(),
            token_out: config.base_token.clone(),
            fee_tier: config.initialization.fee_tier,
            recipient: config.wallet_address.clone(),
            amount,
            slippage,
        })],
    )
}

/// Exactly one swap receipt whose resolved symbols match the request.
pub fn apply_outcome(batch: &ActionBatch, receipts: &[ActionReceipt]) -> StrategyResult<()> {
    let Some(request) = batch.swap() else {
        return Err(StrategyError::Contract(format!(
            "batch {} has no swap action",
            batch.id()
        )));
    };

    let swaps: Vec<(&str, &str)> = receipts
        .iter()
        .filter_map(|r| match r {
            ActionReceipt::Swap {
                token_in_symbol,
                token_out_symbol,
                ..
            } => Some((token_in_symbol.as_str(), token_out_symbol.as_str())),
            _ => None,
        })
        .collect();

    let [(token_in, token_out)] = swaps.as_slice() else {
        return Err(StrategyError::validation(
            STEP,
            format!("expected exactly one swap receipt, got {}", swaps.len()),
        ));
    };

    if !request.token_in.matches_symbol(token_in) || !request.token_out.matches_symbol(token_out) {
        return Err(StrategyError::validation(
            STEP,
            format!(
                "swapped {token_in} -> {token_out}, requested {} -> {}",
                request.token_in.symbol, request.token_out.symbol
            ),
        ));
    }
    Ok(())
}
