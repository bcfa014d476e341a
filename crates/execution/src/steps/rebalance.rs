//! REBALANCE: close the current position and reopen around spot.

use super::provide_liquidity::{open_action, record_opened};
use super::teardown::{close_action, record_closed};
use super::StepContext;
use crate::error::{StrategyError, StrategyResult};
use chrono::{DateTime, Utc};
use clmm_cycle_domain::action::{ActionBatch, ActionReceipt};
use clmm_cycle_domain::state::{PersistentState, StrategyState};
use tracing::info;

const STEP: StrategyState = StrategyState::Rebalance;

/// Emits close(current) followed by open(new band around spot).
///
/// # Errors
/// Returns [`StrategyError::Precondition`] when no position is open.
pub async fn emit(ctx: &StepContext<'_>, state: &mut PersistentState) -> StrategyResult<ActionBatch> {
    let Some(position_id) = state.position_id.clone() else {
        return Err(StrategyError::precondition(STEP, "no open position to rebalance"));
    };

    let spot = ctx.spot_price().await?;
    let close = close_action(ctx, state, position_id.clone());
    let (open, range) = open_action(ctx, state, spot, STEP).await?;

    info!(
        position = %position_id,
        spot = %spot,
        lower = %range.lower_price,
        upper = %range.upper_price,
        attempt = state.retry_count,
        "Rebalancing position"
    );
    state.last_price = Some(spot.value);
    ctx.batch(STEP, vec![close, open])
}

/// Both the close and the open receipt are required.
pub fn apply_outcome(
    batch: &ActionBatch,
    receipts: &[ActionReceipt],
    state: &mut PersistentState,
    now: DateTime<Utc>,
) -> StrategyResult<()> {
    record_closed(batch, receipts, state)?;
    record_opened(STEP, receipts, state, now).map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::steps::testing;
    use clmm_cycle_domain::action::Action;
    use clmm_cycle_domain::state::PositionId;
    use clmm_cycle_domain::token::TokenAmount;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_requires_open_position() {
        let config = testing::config();
        let market = testing::market(&config).await;
        let ctx = StepContext::new(&config, &market, Utc::now());

        let err = emit(&ctx, &mut PersistentState::default()).await.unwrap_err();
        assert!(matches!(err, StrategyError::Precondition { step: STEP, .. }));
    }

    #[tokio::test]
    async fn test_close_then_open() {
        let config = testing::config();
        let market = testing::market(&config).await;
        market
            .set_spot_price(config.pool_address.clone(), dec!(2300))
            .await;
        let now = Utc::now();
        let ctx = StepContext::new(&config, &market, now);
        let mut state = PersistentState::default();
        state.position_id = Some(PositionId::new("4411"));

        let batch = emit(&ctx, &mut state).await.unwrap();
        assert!(matches!(batch.actions()[0], Action::ClosePosition(_)));
        assert!(matches!(batch.actions()[1], Action::OpenPosition(_)));
        assert_eq!(batch.open_position().unwrap().price_lower.value, dec!(2254));
        assert_eq!(state.last_price, Some(dec!(2300)));

        let receipts = [
            ActionReceipt::PositionClosed {
                position_id: PositionId::new("4411"),
                amount0: TokenAmount::from(1u64),
                amount1: TokenAmount::from(1u64),
            },
            ActionReceipt::PositionOpened {
                position_id: PositionId::new("4412"),
                amount0: TokenAmount::from(1u64),
                amount1: TokenAmount::from(1u64),
            },
        ];
        apply_outcome(&batch, &receipts, &mut state, now).unwrap();
        assert_eq!(state.position_id, Some(PositionId::new("4412")));
        assert_eq!(state.last_rebalance_time, Some(now));
    }
}
