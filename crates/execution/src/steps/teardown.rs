//! TEARDOWN: close the open position, if any.

use super::StepContext;
use crate::error::{StrategyError, StrategyResult};
use clmm_cycle_domain::action::{Action, ActionBatch, ActionReceipt, ClosePositionParams};
use clmm_cycle_domain::state::{PersistentState, PositionId, StrategyState};
use tracing::info;

const STEP: StrategyState = StrategyState::Teardown;

/// Emits a close of the open position, or nothing when none is open.
pub fn emit(ctx: &StepContext<'_>, state: &mut PersistentState) -> StrategyResult<Option<ActionBatch>> {
    let Some(position_id) = state.position_id.clone() else {
        info!("No open position to close");
        return Ok(None);
    };
    info!(position = %position_id, "Closing position for teardown");
    let action = close_action(ctx, state, position_id);
    ctx.batch(STEP, vec![action]).map(Some)
}

pub(crate) fn close_action(
    ctx: &StepContext<'_>,
    state: &PersistentState,
    position_id: PositionId,
) -> Action {
    let config = ctx.config;
    Action::ClosePosition(ClosePositionParams {
        position_id,
        recipient: config.wallet_address.clone(),
        token0: config.base_token.address.clone(),
        token1: config.quote_token.address.clone(),
        slippage: ctx.slippage(state),
    })
}

/// Checks the close receipt names the position the batch closed and clears
/// it from the state.
pub(crate) fn record_closed(
    batch: &ActionBatch,
    receipts: &[ActionReceipt],
    state: &mut PersistentState,
) -> StrategyResult<()> {
    let step = batch.step();
    let Some(request) = batch.close_position() else {
        return Err(StrategyError::Contract(format!(
            "batch {} has no close action",
            batch.id()
        )));
    };
    let closed = receipts.iter().find_map(|r| match r {
        ActionReceipt::PositionClosed { position_id, .. } => Some(position_id),
        _ => None,
    });
    match closed {
        Some(id) if *id == request.position_id => {
            info!(position = %id, "Position closed");
            if state.position_id.as_ref() == Some(id) {
                state.position_id = None;
            }
            Ok(())
        }
        Some(id) => Err(StrategyError::validation(
            step,
            format!("closed position {id}, requested {}", request.position_id),
        )),
        None => Err(StrategyError::validation(step, "no position-closed receipt")),
    }
}

pub fn apply_outcome(
    batch: &ActionBatch,
    receipts: &[ActionReceipt],
    state: &mut PersistentState,
) -> StrategyResult<()> {
    record_closed(batch, receipts, state)
}
