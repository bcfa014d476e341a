//! Recovery controller for outstanding batches.
//!
//! Runs before normal dispatch whenever a batch is outstanding. Successful
//! outcomes are validated and applied; failed and cancelled ones are retried
//! for the same step with escalated slippage up to `max_sadflow_retries`;
//! unconfirmed ones are re-polled up to `max_not_included_retries` and then
//! treated as failed.

use crate::error::{StrategyError, StrategyResult};
use crate::steps::{self, StepContext};
use clmm_cycle_domain::action::{ActionBatch, ActionOutcome, ExecutionStatus};
use clmm_cycle_domain::state::PersistentState;
use tracing::{error, info, warn};

/// What the driver does after recovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recovery {
    /// The outstanding batch is resolved; continue with normal dispatch.
    Resume,
    /// A replacement batch was emitted for the same step.
    Retry(ActionBatch),
    /// Nothing to do until the outcome changes.
    Wait,
}

/// Resolves the outstanding batch against `outcome`.
///
/// # Errors
/// - [`StrategyError::Contract`] when the outcome is for a different batch
///   or nothing is outstanding
/// - [`StrategyError::Validation`] when a SUCCESS outcome does not match the
///   request
/// - [`StrategyError::RetriesExhausted`] when the retry bound is exceeded
pub async fn recover(
    ctx: &StepContext<'_>,
    state: &mut PersistentState,
    outcome: Option<&ActionOutcome>,
) -> StrategyResult<Recovery> {
    let Some(batch) = state.pending_batch.clone() else {
        return match outcome {
            Some(outcome) => Err(StrategyError::Contract(format!(
                "outcome reported for batch {} but no batch is outstanding",
                outcome.batch_id
            ))),
            None => Ok(Recovery::Resume),
        };
    };
    let Some(outcome) = outcome else {
        return Ok(Recovery::Wait);
    };
    if outcome.batch_id != batch.id() {
        return Err(StrategyError::Contract(format!(
            "outcome reported for batch {}, outstanding batch is {}",
            outcome.batch_id,
            batch.id()
        )));
    }

    match outcome.status {
        ExecutionStatus::Success => {
            steps::apply_success(&batch, outcome, state, ctx.now)?;
            info!(batch_id = %batch.id(), step = %batch.step(), "Batch succeeded");
            state.clear_awaiting();
            Ok(Recovery::Resume)
        }
        ExecutionStatus::Failed | ExecutionStatus::Cancelled => {
            retry(ctx, state, &batch, outcome.status).await
        }
        ExecutionStatus::NotIncluded => {
            state.not_included_counter += 1;
            if state.not_included_counter > ctx.config.max_not_included_retries {
                warn!(
                    batch_id = %batch.id(),
                    polls = state.not_included_counter,
                    "Batch still not included, treating as failed"
                );
                state.not_included_counter = 0;
                return retry(ctx, state, &batch, outcome.status).await;
            }
            info!(
                batch_id = %batch.id(),
                polls = state.not_included_counter,
                max = ctx.config.max_not_included_retries,
                "Batch not included yet"
            );
            Ok(Recovery::Wait)
        }
    }
}

async fn retry(
    ctx: &StepContext<'_>,
    state: &mut PersistentState,
    failed: &ActionBatch,
    status: ExecutionStatus,
) -> StrategyResult<Recovery> {
    let step = failed.step();
    state.sadflow_counter += 1;
    if state.sadflow_counter > ctx.config.max_sadflow_retries {
        error!(
            batch_id = %failed.id(),
            step = %step,
            attempts = state.sadflow_counter,
            "Retry bound exceeded"
        );
        return Err(StrategyError::RetriesExhausted {
            step,
            attempts: state.sadflow_counter,
        });
    }

    state.retry_count += 1;
    warn!(
        batch_id = %failed.id(),
        step = %step,
        status = %status,
        attempt = state.sadflow_counter,
        max = ctx.config.max_sadflow_retries,
        slippage = %ctx.slippage(state),
        "Batch unsuccessful, retrying step"
    );

    match steps::emit(step, ctx, state).await? {
        Some(batch) => {
            state.replace_pending(batch.clone());
            Ok(Recovery::Retry(batch))
        }
        None => {
            info!(step = %step, "Nothing left to retry");
            state.clear_awaiting();
            Ok(Recovery::Resume)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::steps::testing;
    use chrono::Utc;
    use clmm_cycle_domain::action::BatchId;
    use clmm_cycle_domain::state::{PositionId, StrategyState};

    #[tokio::test]
    async fn test_no_outcome_waits() {
        let config = testing::config();
        let market = testing::market(&config).await;
        let ctx = StepContext::new(&config, &market, Utc::now());
        let mut state = PersistentState::default();
        let batch = steps::emit(StrategyState::Initialization, &ctx, &mut state)
            .await
            .unwrap()
            .unwrap();
        state.begin_awaiting(batch);

        let before = state.clone();
        assert_eq!(recover(&ctx, &mut state, None).await.unwrap(), Recovery::Wait);
        assert_eq!(state, before);
    }

    #[tokio::test]
    async fn test_foreign_outcome_is_a_contract_violation() {
        let config = testing::config();
        let market = testing::market(&config).await;
        let ctx = StepContext::new(&config, &market, Utc::now());
        let mut state = PersistentState::default();
        let batch = steps::emit(StrategyState::Initialization, &ctx, &mut state)
            .await
            .unwrap()
            .unwrap();
        state.begin_awaiting(batch);

        let stray = ActionOutcome::success(BatchId::new(), vec![]);
        let err = recover(&ctx, &mut state, Some(&stray)).await.unwrap_err();
        assert!(matches!(err, StrategyError::Contract(_)));

        let mut idle = PersistentState::default();
        let err = recover(&ctx, &mut idle, Some(&stray)).await.unwrap_err();
        assert!(matches!(err, StrategyError::Contract(_)));
    }

    #[tokio::test]
    async fn test_not_included_escalates_to_retry() {
        let config = testing::config();
        let market = testing::market(&config).await;
        let ctx = StepContext::new(&config, &market, Utc::now());
        let mut state = PersistentState::default();
        let batch = steps::emit(StrategyState::Initialization, &ctx, &mut state)
            .await
            .unwrap()
            .unwrap();
        let id = batch.id();
        state.begin_awaiting(batch);

        let pending = ActionOutcome::with_status(id, ExecutionStatus::NotIncluded);
        for poll in 1..=config.max_not_included_retries {
            assert_eq!(
                recover(&ctx, &mut state, Some(&pending)).await.unwrap(),
                Recovery::Wait
            );
            assert_eq!(state.not_included_counter, poll);
        }

        let recovery = recover(&ctx, &mut state, Some(&pending)).await.unwrap();
        assert!(matches!(recovery, Recovery::Retry(_)));
        assert_eq!(state.not_included_counter, 0);
        assert_eq!(state.sadflow_counter, 1);
        assert_eq!(state.retry_count, 1);
        assert_ne!(state.current_actions, vec![id]);
    }

    #[tokio::test]
    async fn test_teardown_retry_without_position_resolves() {
        let config = testing::config();
        let market = testing::market(&config).await;
        let ctx = StepContext::new(&config, &market, Utc::now());
        let mut state = PersistentState::default();
        state.position_id = Some(PositionId::new("4411"));
        let batch = steps::emit(StrategyState::Teardown, &ctx, &mut state)
            .await
            .unwrap()
            .unwrap();
        let id = batch.id();
        state.current_state = StrategyState::Terminated;
        state.begin_awaiting(batch);
        state.position_id = None;

        let failed = ActionOutcome::with_status(id, ExecutionStatus::Failed);
        let recovery = recover(&ctx, &mut state, Some(&failed)).await.unwrap();
        assert_eq!(recovery, Recovery::Resume);
        assert!(!state.is_awaiting());
        assert!(state.validate().is_ok());
    }
}
