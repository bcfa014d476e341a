//! PROVIDE_LIQUIDITY: open a position in a band around spot.

use super::StepContext;
use super::teardown::{close_action, record_closed};
use crate::error::{StrategyError, StrategyResult};
use chrono::{DateTime, Utc};
use clmm_cycle_domain::action::{Action, ActionBatch, ActionReceipt, OpenPositionParams};
use clmm_cycle_domain::state::{PersistentState, PositionId, StrategyState};
use clmm_cycle_domain::value_objects::{Price, PriceRange};
use rust_decimal::Decimal;
use tracing::{info, warn};

const STEP: StrategyState = StrategyState::ProvideLiquidity;

/// Emits an open-position action over `[p·(1−w), p·(1+w)]` with the whole
/// wallet balance of both tokens, and records `p` as the last price.
///
/// A position still tracked from the previous cycle is closed in the same
/// batch, ahead of the open.
///
/// # Errors
/// Returns [`StrategyError::Precondition`] when the wallet holds neither
/// token and there is no carried-over position to close.
pub async fn emit(ctx: &StepContext<'_>, state: &mut PersistentState) -> StrategyResult<ActionBatch> {
    let spot = ctx.spot_price().await?;
    let (open, range) = open_action(ctx, state, spot, STEP).await?;

    let mut actions = Vec::with_capacity(2);
    match state.position_id.clone() {
        Some(previous) => {
            warn!(position = %previous, "Closing position carried over from the previous cycle");
            actions.push(close_action(ctx, state, previous));
        }
        None => {
            if let Action::OpenPosition(p) = &open {
                if p.amount0_desired.is_zero() && p.amount1_desired.is_zero() {
                    return Err(StrategyError::precondition(
                        STEP,
                        "wallet holds neither pool token",
                    ));
                }
            }
        }
    }
    actions.push(open);

    info!(
        spot = %spot,
        lower = %range.lower_price,
        upper = %range.upper_price,
        "Opening position"
    );
    state.last_price = Some(spot.value);
    ctx.batch(STEP, actions)
}

/// Builds the open-position action around `spot` with current balances.
pub(crate) async fn open_action(
    ctx: &StepContext<'_>,
    state: &PersistentState,
    spot: Price,
    step: StrategyState,
) -> StrategyResult<(Action, PriceRange)> {
    let config = ctx.config;
    if spot.value <= Decimal::ZERO {
        return Err(StrategyError::precondition(
            step,
            format!("spot price {spot} is not positive"),
        ));
    }
    let range = PriceRange::around(spot, config.range_width)
        .map_err(|e| StrategyError::precondition(step, e.to_string()))?;
    let amount0 = ctx.balance(&config.base_token.address).await?;
    let amount1 = ctx.balance(&config.quote_token.address).await?;

    let action = Action::OpenPosition(OpenPositionParams {
        token0: config.base_token.clone(),
        token1: config.quote_token.clone(),
        fee_tier: config.position_fee_tier,
        price_lower: range.lower_price,
        price_upper: range.upper_price,
        amount0_desired: amount0,
        amount1_desired: amount1,
        recipient: config.wallet_address.clone(),
        slippage: ctx.slippage(state),
    });
    Ok((action, range))
}

/// Takes the position id from the open receipt.
pub(crate) fn record_opened(
    step: StrategyState,
    receipts: &[ActionReceipt],
    state: &mut PersistentState,
    now: DateTime<Utc>,
) -> StrategyResult<PositionId> {
    let opened = receipts.iter().find_map(|r| match r {
        ActionReceipt::PositionOpened { position_id, .. } => Some(position_id.clone()),
        _ => None,
    });
    let Some(position_id) = opened else {
        return Err(StrategyError::validation(step, "no position-opened receipt"));
    };
    info!(position = %position_id, "Position opened");
    state.position_id = Some(position_id.clone());
    state.last_rebalance_time = Some(now);
    Ok(position_id)
}

/// The open receipt must carry the new position id; a batch that also
/// closed a carried-over position needs the matching close receipt.
pub fn apply_outcome(
    batch: &ActionBatch,
    receipts: &[ActionReceipt],
    state: &mut PersistentState,
    now: DateTime<Utc>,
) -> StrategyResult<()> {
    if batch.close_position().is_some() {
        record_closed(batch, receipts, state)?;
    }
    record_opened(STEP, receipts, state, now).map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::steps::testing;
    use clmm_cycle_domain::token::TokenAmount;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_opens_two_percent_band() {
        let config = testing::config();
        let market = testing::market(&config).await;
        market
            .set_balance(
                config.wallet_address.clone(),
                config.base_token.address.clone(),
                TokenAmount::from(250_000_000_000_000_000u64),
            )
            .await;
        let ctx = StepContext::new(&config, &market, Utc::now());
        let mut state = PersistentState::default();

        let batch = emit(&ctx, &mut state).await.unwrap();
        let open = batch.open_position().unwrap();
        assert_eq!(open.price_lower.value, dec!(1960));
        assert_eq!(open.price_upper.value, dec!(2040));
        assert_eq!(open.token0, config.base_token);
        assert_eq!(open.token1, config.quote_token);
        assert_eq!(open.fee_tier, 500);
        assert_eq!(state.last_price, Some(dec!(2000)));
    }

    #[tokio::test]
    async fn test_empty_wallet_is_a_precondition_failure() {
        let config = testing::config();
        let market = testing::market(&config).await;
        market
            .set_balance(
                config.wallet_address.clone(),
                config.quote_token.address.clone(),
                TokenAmount::zero(),
            )
            .await;
        let ctx = StepContext::new(&config, &market, Utc::now());

        let mut state = PersistentState::default();
        let err = emit(&ctx, &mut state).await.unwrap_err();
        assert!(matches!(err, StrategyError::Precondition { .. }));
        assert_eq!(state.last_price, None);
    }

    #[tokio::test]
    async fn test_carried_over_position_is_closed_first() {
        let config = testing::config();
        let market = testing::market(&config).await;
        let now = Utc::now();
        let ctx = StepContext::new(&config, &market, now);
        let mut state = PersistentState::default();
        state.position_id = Some(PositionId::new("4411"));

        let batch = emit(&ctx, &mut state).await.unwrap();
        assert!(matches!(batch.actions()[0], Action::ClosePosition(_)));
        assert!(matches!(batch.actions()[1], Action::OpenPosition(_)));
        assert_eq!(
            batch.close_position().unwrap().position_id,
            PositionId::new("4411")
        );

        let opened = ActionReceipt::PositionOpened {
            position_id: PositionId::new("5000"),
            amount0: TokenAmount::from(1u64),
            amount1: TokenAmount::from(1u64),
        };
        let err = apply_outcome(&batch, std::slice::from_ref(&opened), &mut state.clone(), now)
            .unwrap_err();
        assert!(matches!(err, StrategyError::Validation { step: STEP, .. }));

        let receipts = [
            ActionReceipt::PositionClosed {
                position_id: PositionId::new("4411"),
                amount0: TokenAmount::from(1u64),
                amount1: TokenAmount::from(1u64),
            },
            opened,
        ];
        apply_outcome(&batch, &receipts, &mut state, now).unwrap();
        assert_eq!(state.position_id, Some(PositionId::new("5000")));
    }

    #[tokio::test]
    async fn test_absurd_spot_price_is_a_precondition_failure() {
        let config = testing::config();
        let market = testing::market(&config).await;
        market
            .set_spot_price(config.pool_address.clone(), Decimal::MAX)
            .await;
        let ctx = StepContext::new(&config, &market, Utc::now());

        let mut state = PersistentState::default();
        let err = emit(&ctx, &mut state).await.unwrap_err();
        assert!(matches!(err, StrategyError::Precondition { step: STEP, .. }));
        assert_eq!(state.last_price, None);
    }

    #[test]
    fn test_open_receipt_sets_position() {
        let now = Utc::now();
        let mut state = PersistentState::default();
        let receipts = [ActionReceipt::PositionOpened {
            position_id: PositionId::new("4411"),
            amount0: TokenAmount::from(1u64),
            amount1: TokenAmount::from(1u64),
        }];

        let id = record_opened(STEP, &receipts, &mut state, now).unwrap();
        assert_eq!(id, PositionId::new("4411"));
        assert_eq!(state.position_id, Some(id));
        assert_eq!(state.last_rebalance_time, Some(now));

        assert!(record_opened(STEP, &[], &mut PersistentState::default(), now).is_err());
    }
}
