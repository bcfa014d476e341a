//! INITIALIZATION: approve the router to spend the seed balance.

use super::StepContext;
use crate::error::{StrategyError, StrategyResult};
use clmm_cycle_domain::action::{Action, ActionBatch, ActionReceipt, ApproveParams};
use clmm_cycle_domain::state::{PersistentState, StrategyState};
use tracing::{info, warn};

const STEP: StrategyState = StrategyState::Initialization;

/// Emits an approval of the full quote-token balance to the router.
///
/// # Errors
/// Returns [`StrategyError::Precondition`] when the wallet holds no seed
/// token.
pub async fn emit(ctx: &StepContext<'_>, _state: &mut PersistentState) -> StrategyResult<ActionBatch> {
    let config = ctx.config;
    let token = &config.quote_token;
    let balance = ctx.balance(&token.address).await?;

    if balance.is_zero() {
        return Err(StrategyError::precondition(
            STEP,
            format!(
                "wallet {} holds no {} to seed the strategy",
                config.wallet_address, token.symbol
            ),
        ));
    }
    if balance < config.initialization.initial_amount {
        warn!(
            token = %token.symbol,
            balance = %balance,
            expected = %config.initialization.initial_amount,
            "Seed balance below configured initial amount"
        );
    }

    info!(
        token = %token.symbol,
        spender = %config.router_address,
        amount = %balance,
        "Approving seed balance"
    );

    ctx.batch(
        STEP,
        vec![Action::Approve(ApproveParams {
            token: token.address.clone(),
            spender: config.router_address.clone(),
            owner: config.wallet_address.clone(),
            amount: balance,
        })],
    )
}

/// An approval receipt for the requested token must be present.
pub fn apply_outcome(batch: &ActionBatch, receipts: &[ActionReceipt]) -> StrategyResult<()> {
    let requested = batch.actions().iter().find_map(|a| match a {
        Action::Approve(p) => Some(&p.token),
        _ => None,
    });
    let Some(requested) = requested else {
        return Err(StrategyError::Contract(format!(
            "batch {} has no approval action",
            batch.id()
        )));
    };

    let approved = receipts.iter().any(|r| match r {
        ActionReceipt::Approve { token, .. } => token == requested,
        _ => false,
    });
    if !approved {
        return Err(StrategyError::validation(
            STEP,
            format!("no approval receipt for token {requested}"),
        ));
    }
    Ok(())
}
