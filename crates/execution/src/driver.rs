//! State-machine driver.
//!
//! [`StateMachine::advance`] takes the persisted state and the outcome of
//! the outstanding batch (if the collaborator reported one) and returns the
//! next state plus at most one batch to dispatch. It performs no persistence
//! and no submission; on error the caller's state is untouched.

use crate::error::StrategyResult;
use crate::sadflow::{self, Recovery};
use crate::steps::{self, StepContext};
use crate::trigger::TriggerEvaluator;
use chrono::{DateTime, Utc};
use clmm_cycle_data::MarketDataProvider;
use clmm_cycle_domain::action::{ActionBatch, ActionOutcome};
use clmm_cycle_domain::config::StrategyConfig;
use clmm_cycle_domain::state::{PersistentState, StrategyState};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

/// How a call to [`StateMachine::advance`] resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionKind {
    /// `pause_strategy` is set; nothing was evaluated.
    Paused,
    /// A batch is outstanding and has no final outcome yet.
    Waiting,
    /// An unsuccessful batch was replaced by a retry.
    Retried,
    /// A new batch was emitted.
    Emitted,
    /// The state changed without a batch (trigger evaluated, cursor moved,
    /// outstanding batch resolved).
    Updated,
    /// Nothing changed.
    Idle,
}

impl fmt::Display for TransitionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TransitionKind::Paused => "paused",
            TransitionKind::Waiting => "waiting",
            TransitionKind::Retried => "retried",
            TransitionKind::Emitted => "emitted",
            TransitionKind::Updated => "updated",
            TransitionKind::Idle => "idle",
        };
        f.write_str(s)
    }
}

/// Result of one driver step.
#[derive(Debug, Clone)]
pub struct Transition {
    /// State to persist before the batch is dispatched.
    pub state: PersistentState,
    /// Batch to dispatch, if any. Its id is in `state.current_actions`.
    pub batch: Option<ActionBatch>,
    /// How the call resolved.
    pub kind: TransitionKind,
}

/// The strategy state machine, bound to a configuration and a market.
pub struct StateMachine {
    config: Arc<StrategyConfig>,
    market: Arc<dyn MarketDataProvider>,
    trigger: TriggerEvaluator,
}

impl StateMachine {
    /// Creates a new state machine.
    pub fn new(config: Arc<StrategyConfig>, market: Arc<dyn MarketDataProvider>) -> Self {
        let trigger = TriggerEvaluator::from_config(&config);
        Self {
            config,
            market,
            trigger,
        }
    }

    /// Gets the configuration.
    pub fn config(&self) -> &StrategyConfig {
        &self.config
    }

    /// Advances the strategy by one step.
    ///
    /// Order of evaluation:
    /// 1. pause short-circuit
    /// 2. recovery of the outstanding batch, if any
    /// 3. teardown override for COMPLETED and MONITOR_PRICE
    /// 4. dispatch on the cursor
    ///
    /// # Errors
    /// Any step, validation, retry-bound or contract failure. The input state
    /// is never modified.
    pub async fn advance(
        &self,
        state: &PersistentState,
        outcome: Option<&ActionOutcome>,
        now: DateTime<Utc>,
    ) -> StrategyResult<Transition> {
        if self.config.pause_strategy {
            info!(state = %state.current_state, "Strategy paused, skipping");
            return Ok(Transition {
                state: state.clone(),
                batch: None,
                kind: TransitionKind::Paused,
            });
        }
        state.validate()?;

        let mut next = state.clone();
        let ctx = StepContext::new(&self.config, self.market.as_ref(), now);

        if next.is_awaiting() || outcome.is_some() {
            match sadflow::recover(&ctx, &mut next, outcome).await? {
                Recovery::Wait => {
                    debug!(state = %next.current_state, "Awaiting outcome");
                    return Ok(Transition {
                        state: next,
                        batch: None,
                        kind: TransitionKind::Waiting,
                    });
                }
                Recovery::Retry(batch) => {
                    return Ok(Transition {
                        state: next,
                        batch: Some(batch),
                        kind: TransitionKind::Retried,
                    });
                }
                Recovery::Resume => {}
            }
        }

        if self.config.initiate_teardown
            && matches!(
                next.current_state,
                StrategyState::Completed | StrategyState::MonitorPrice
            )
        {
            info!(from = %next.current_state, "Teardown requested");
            next.current_state = StrategyState::Teardown;
        }

        let batch = self.dispatch(&ctx, &mut next).await?;
        let kind = match (&batch, next == *state) {
            (Some(_), _) => TransitionKind::Emitted,
            (None, false) => TransitionKind::Updated,
            (None, true) => TransitionKind::Idle,
        };
        Ok(Transition {
            state: next,
            batch,
            kind,
        })
    }

    async fn dispatch(
        &self,
        ctx: &StepContext<'_>,
        state: &mut PersistentState,
    ) -> StrategyResult<Option<ActionBatch>> {
        let step = state.current_state;
        match step {
            StrategyState::Initialization
            | StrategyState::SwapToBase
            | StrategyState::ProvideLiquidity
            | StrategyState::Rebalance
            | StrategyState::Teardown => {
                let batch = steps::emit(step, ctx, state).await?;
                state.current_state = steps::successor(step);
                match &batch {
                    Some(batch) => {
                        info!(
                            step = %step,
                            next = %state.current_state,
                            batch_id = %batch.id(),
                            actions = batch.actions().len(),
                            "Batch emitted"
                        );
                        state.begin_awaiting(batch.clone());
                    }
                    None => info!(step = %step, next = %state.current_state, "No batch needed"),
                }
                Ok(batch)
            }
            StrategyState::MonitorPrice => {
                if self.trigger.evaluate(ctx, state).await? {
                    state.current_state = StrategyState::Rebalance;
                }
                Ok(None)
            }
            StrategyState::Completed | StrategyState::Terminated => {
                debug!(state = %step, "Nothing to do");
                Ok(None)
            }
        }
    }
}
