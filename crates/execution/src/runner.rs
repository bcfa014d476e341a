//! Per-invocation orchestration.
//!
//! One [`StrategyRunner::tick`] is one scheduled invocation: load the state,
//! collect the outcome of the outstanding batch, advance the machine, persist
//! the result and only then hand the emitted batch to the executor. A crash
//! between the save and the submission leaves a persisted batch the executor
//! has never seen; the next tick detects that and submits it again.

use crate::driver::{StateMachine, TransitionKind};
use crate::error::{StrategyError, StrategyResult};
use chrono::{DateTime, Utc};
use clmm_cycle_data::{ExecutionClient, MarketDataProvider, StateStore, StoredState};
use clmm_cycle_domain::action::BatchId;
use clmm_cycle_domain::config::StrategyConfig;
use clmm_cycle_domain::state::{FlowStatus, PersistentState, StrategyState};
use std::sync::Arc;
use tracing::{info, warn};

/// Summary of one tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickReport {
    /// How the driver call resolved.
    pub kind: TransitionKind,
    /// Cursor after the tick.
    pub state: StrategyState,
    /// Flow status after the tick.
    pub flow: FlowStatus,
    /// Batch handed to the executor during this tick, if any.
    pub submitted: Option<BatchId>,
    /// Stored document version after the tick.
    pub version: u64,
}

/// Wires the state machine to its collaborators.
pub struct StrategyRunner {
    config: Arc<StrategyConfig>,
    machine: StateMachine,
    store: Arc<dyn StateStore>,
    execution: Arc<dyn ExecutionClient>,
}

impl StrategyRunner {
    /// Creates a new strategy runner.
    ///
    /// # Errors
    /// Returns [`StrategyError::Config`] if `config` fails validation.
    pub fn new(
        config: Arc<StrategyConfig>,
        market: Arc<dyn MarketDataProvider>,
        store: Arc<dyn StateStore>,
        execution: Arc<dyn ExecutionClient>,
    ) -> StrategyResult<Self> {
        config.validate()?;
        let machine = StateMachine::new(config.clone(), market);
        Ok(Self {
            config,
            machine,
            store,
            execution,
        })
    }

    /// Gets the configuration.
    pub fn config(&self) -> &StrategyConfig {
        &self.config
    }

    fn strategy_id(&self) -> &str {
        &self.config.id
    }

    async fn load_or_default(&self) -> StrategyResult<StoredState> {
        match self.store.load(self.strategy_id()).await? {
            Some(stored) => Ok(stored),
            None => {
                info!(strategy_id = self.strategy_id(), "No persisted state, starting new cycle");
                Ok(StoredState {
                    state: PersistentState::default(),
                    version: 0,
                })
            }
        }
    }

    async fn load_existing(&self) -> StrategyResult<StoredState> {
        self.store
            .load(self.strategy_id())
            .await?
            .ok_or_else(|| StrategyError::MissingState(self.strategy_id().to_string()))
    }

    /// Runs one invocation at the current time.
    ///
    /// # Errors
    /// Any driver error, collaborator failure or store conflict. Nothing is
    /// persisted or submitted when an error is returned.
    pub async fn tick(&self) -> StrategyResult<TickReport> {
        self.tick_at(Utc::now()).await
    }

    /// Runs one invocation at `now`.
    ///
    /// # Errors
    /// See [`StrategyRunner::tick`].
    pub async fn tick_at(&self, now: DateTime<Utc>) -> StrategyResult<TickReport> {
        let StoredState { state, version } = self.load_or_default().await?;

        if self.config.pause_strategy {
            info!(strategy_id = self.strategy_id(), "Strategy paused, tick skipped");
            return Ok(TickReport {
                kind: TransitionKind::Paused,
                state: state.current_state,
                flow: state.current_flow_status,
                submitted: None,
                version,
            });
        }

        let mut outcome = None;
        let mut submitted = None;
        if let Some(batch) = state.outstanding_batch() {
            outcome = self
                .execution
                .outcome(&batch.id())
                .await
                .map_err(StrategyError::Execution)?;
            if outcome.is_none() {
                let known = self
                    .execution
                    .is_submitted(&batch.id())
                    .await
                    .map_err(StrategyError::Execution)?;
                if !known {
                    warn!(
                        batch_id = %batch.id(),
                        step = %batch.step(),
                        "Outstanding batch never reached the executor, submitting again"
                    );
                    self.execution
                        .submit(batch)
                        .await
                        .map_err(StrategyError::Execution)?;
                    submitted = Some(batch.id());
                }
            }
        }

        let transition = self.machine.advance(&state, outcome.as_ref(), now).await?;

        let version = if transition.state == state {
            version
        } else {
            self.store
                .save(self.strategy_id(), &transition.state, version)
                .await?
        };

        if let Some(batch) = &transition.batch {
            self.execution
                .submit(batch)
                .await
                .map_err(StrategyError::Execution)?;
            submitted = Some(batch.id());
        }

        info!(
            strategy_id = self.strategy_id(),
            kind = %transition.kind,
            state = %transition.state.current_state,
            version = version,
            "Tick complete"
        );
        Ok(TickReport {
            kind: transition.kind,
            state: transition.state.current_state,
            flow: transition.state.current_flow_status,
            submitted,
            version,
        })
    }

    /// Starts a new cycle after the strategy was marked complete.
    ///
    /// From TERMINATED this is a no-op and returns the stored state.
    ///
    /// # Errors
    /// [`StrategyError::NotRestartable`] from any other state.
    pub async fn restart(&self) -> StrategyResult<PersistentState> {
        let StoredState { mut state, version } = self.load_existing().await?;
        match state.current_state {
            StrategyState::Completed => {
                state.reset_cycle();
                self.store.save(self.strategy_id(), &state, version).await?;
                info!(strategy_id = self.strategy_id(), "Cycle restarted");
                Ok(state)
            }
            StrategyState::Terminated => {
                info!(strategy_id = self.strategy_id(), "Strategy terminated, restart ignored");
                Ok(state)
            }
            other => Err(StrategyError::NotRestartable(other)),
        }
    }

    /// Marks the current cycle complete.
    ///
    /// # Errors
    /// [`StrategyError::NotCompletable`] while a batch is outstanding or once
    /// the strategy is terminated.
    pub async fn mark_complete(&self) -> StrategyResult<PersistentState> {
        let StoredState { mut state, version } = self.load_existing().await?;
        if state.is_awaiting() {
            return Err(StrategyError::NotCompletable {
                state: state.current_state,
                reason: "a batch is still outstanding".into(),
            });
        }
        if state.current_state == StrategyState::Terminated {
            return Err(StrategyError::NotCompletable {
                state: state.current_state,
                reason: "strategy is terminated".into(),
            });
        }
        state.current_state = StrategyState::Completed;
        state.completed = true;
        self.store.save(self.strategy_id(), &state, version).await?;
        info!(strategy_id = self.strategy_id(), "Cycle marked complete");
        Ok(state)
    }

    /// Returns the persisted state, if any.
    ///
    /// # Errors
    /// Store failures.
    pub async fn status(&self) -> StrategyResult<Option<StoredState>> {
        Ok(self.store.load(self.strategy_id()).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::steps::testing;
    use clmm_cycle_data::{MemoryOutbox, MemoryStateStore, StoreError};
    use clmm_cycle_domain::action::{ActionOutcome, ActionReceipt, ExecutionStatus};
    use clmm_cycle_domain::state::PositionId;
    use clmm_cycle_domain::token::TokenAmount;
    use rust_decimal::Decimal;

    struct Harness {
        runner: StrategyRunner,
        store: Arc<MemoryStateStore>,
        outbox: Arc<MemoryOutbox>,
    }

    async fn harness(config: StrategyConfig) -> Harness {
        let market = Arc::new(testing::market(&config).await);
        let store = Arc::new(MemoryStateStore::new());
        let outbox = Arc::new(MemoryOutbox::new());
        let runner =
            StrategyRunner::new(Arc::new(config), market, store.clone(), outbox.clone()).unwrap();
        Harness {
            runner,
            store,
            outbox,
        }
    }

    fn id() -> &'static str {
        "eth-usdc-base"
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected() {
        let mut config = testing::config();
        let market = Arc::new(testing::market(&config).await);
        config.range_width = Decimal::ZERO;

        let result = StrategyRunner::new(
            Arc::new(config),
            market,
            Arc::new(MemoryStateStore::new()),
            Arc::new(MemoryOutbox::new()),
        );
        assert!(matches!(result, Err(StrategyError::Config(_))));
    }

    #[tokio::test]
    async fn test_first_tick_persists_then_submits() {
        let h = harness(testing::config()).await;

        let report = h.runner.tick().await.unwrap();
        assert_eq!(report.kind, TransitionKind::Emitted);
        assert_eq!(report.state, StrategyState::SwapToBase);
        assert_eq!(report.flow, FlowStatus::AwaitingResult);
        assert_eq!(report.version, 1);

        let stored = h.store.load(id()).await.unwrap().unwrap();
        let submitted = h.outbox.last_submitted().await.unwrap();
        assert_eq!(stored.state.current_actions, vec![submitted.id()]);
        assert_eq!(report.submitted, Some(submitted.id()));
    }

    #[tokio::test]
    async fn test_waiting_tick_changes_nothing() {
        let h = harness(testing::config()).await;
        h.runner.tick().await.unwrap();

        let report = h.runner.tick().await.unwrap();
        assert_eq!(report.kind, TransitionKind::Waiting);
        assert_eq!(report.version, 1);
        assert_eq!(report.submitted, None);
        assert_eq!(h.outbox.submitted().await.len(), 1);
    }

    #[tokio::test]
    async fn test_lost_batch_is_submitted_again() {
        let config = testing::config();
        let market = Arc::new(testing::market(&config).await);
        let store = Arc::new(MemoryStateStore::new());
        let first = StrategyRunner::new(
            Arc::new(config.clone()),
            market.clone(),
            store.clone(),
            Arc::new(MemoryOutbox::new()),
        )
        .unwrap();
        first.tick().await.unwrap();
        let persisted = store.load(id()).await.unwrap().unwrap().state;
        let lost = persisted.outstanding_batch().unwrap().clone();

        let outbox = Arc::new(MemoryOutbox::new());
        let recovered =
            StrategyRunner::new(Arc::new(config), market, store, outbox.clone()).unwrap();
        let report = recovered.tick().await.unwrap();

        assert_eq!(report.kind, TransitionKind::Waiting);
        assert_eq!(report.submitted, Some(lost.id()));
        assert_eq!(outbox.submitted().await, vec![lost]);
    }

    #[tokio::test]
    async fn test_reported_outcome_advances() {
        let config = testing::config();
        let h = harness(config.clone()).await;
        h.runner.tick().await.unwrap();
        let approve = h.outbox.last_submitted().await.unwrap();

        h.outbox
            .report(ActionOutcome::success(
                approve.id(),
                vec![ActionReceipt::Approve {
                    token: config.quote_token.address.clone(),
                    amount: TokenAmount::from(1_000_000_000u64),
                }],
            ))
            .await;
        let report = h.runner.tick().await.unwrap();
        assert_eq!(report.kind, TransitionKind::Emitted);
        assert_eq!(report.state, StrategyState::ProvideLiquidity);
        assert_eq!(report.version, 2);
        let swap = h.outbox.last_submitted().await.unwrap();
        assert_eq!(swap.step(), StrategyState::SwapToBase);
    }

    #[tokio::test]
    async fn test_fatal_error_persists_nothing() {
        let h = harness(testing::config()).await;
        h.runner.tick().await.unwrap();

        for _ in 0..3 {
            let batch = h.outbox.last_submitted().await.unwrap();
            h.outbox
                .report(ActionOutcome::with_status(batch.id(), ExecutionStatus::Failed))
                .await;
            h.runner.tick().await.unwrap();
        }
        let version = h.store.version(id()).await;
        let batch = h.outbox.last_submitted().await.unwrap();
        h.outbox
            .report(ActionOutcome::with_status(batch.id(), ExecutionStatus::Failed))
            .await;

        let err = h.runner.tick().await.unwrap_err();
        assert!(matches!(err, StrategyError::RetriesExhausted { attempts: 4, .. }));
        assert_eq!(h.store.version(id()).await, version);
        assert_eq!(h.outbox.submitted().await.len(), 4);
    }

    /// Store that lets another writer slip in right after every load.
    struct RacingStore {
        inner: MemoryStateStore,
    }

    #[async_trait::async_trait]
    impl StateStore for RacingStore {
        async fn load(&self, strategy_id: &str) -> Result<Option<StoredState>, StoreError> {
            let loaded = self.inner.load(strategy_id).await?;
            if let Some(stored) = &loaded {
                self.inner
                    .save(strategy_id, &stored.state, stored.version)
                    .await?;
            }
            Ok(loaded)
        }

        async fn save(
            &self,
            strategy_id: &str,
            state: &PersistentState,
            expected_version: u64,
        ) -> Result<u64, StoreError> {
            self.inner.save(strategy_id, state, expected_version).await
        }
    }

    #[tokio::test]
    async fn test_concurrent_writer_is_detected() {
        let config = testing::config();
        let market = Arc::new(testing::market(&config).await);
        let store = Arc::new(RacingStore {
            inner: MemoryStateStore::new(),
        });
        store
            .inner
            .save(id(), &PersistentState::default(), 0)
            .await
            .unwrap();
        let outbox = Arc::new(MemoryOutbox::new());
        let runner = StrategyRunner::new(Arc::new(config), market, store, outbox.clone()).unwrap();

        let err = runner.tick().await.unwrap_err();
        assert!(matches!(
            err,
            StrategyError::Store(StoreError::Conflict {
                expected: 1,
                found: 2,
                ..
            })
        ));
        assert!(outbox.submitted().await.is_empty());
    }

    #[tokio::test]
    async fn test_paused_tick_does_not_touch_state() {
        let mut config = testing::config();
        config.pause_strategy = true;
        let h = harness(config).await;

        let report = h.runner.tick().await.unwrap();
        assert_eq!(report.kind, TransitionKind::Paused);
        assert_eq!(report.version, 0);
        assert!(h.store.load(id()).await.unwrap().is_none());
        assert!(h.outbox.submitted().await.is_empty());
    }

    #[tokio::test]
    async fn test_restart_rules() {
        let h = harness(testing::config()).await;
        assert!(matches!(
            h.runner.restart().await,
            Err(StrategyError::MissingState(_))
        ));

        let mut state = PersistentState::default();
        state.current_state = StrategyState::MonitorPrice;
        h.store.save(id(), &state, 0).await.unwrap();
        assert!(matches!(
            h.runner.restart().await,
            Err(StrategyError::NotRestartable(StrategyState::MonitorPrice))
        ));

        let completed = h.runner.mark_complete().await.unwrap();
        assert_eq!(completed.current_state, StrategyState::Completed);
        assert!(completed.completed);

        let restarted = h.runner.restart().await.unwrap();
        assert_eq!(restarted.current_state, StrategyState::Initialization);
        assert!(!restarted.completed);
        assert_eq!(h.store.version(id()).await, 3);

        let mut terminated = restarted.clone();
        terminated.current_state = StrategyState::Terminated;
        h.store.save(id(), &terminated, 3).await.unwrap();
        let unchanged = h.runner.restart().await.unwrap();
        assert_eq!(unchanged, terminated);
        assert_eq!(h.store.version(id()).await, 4);
    }

    #[tokio::test]
    async fn test_restart_closes_position_from_previous_cycle() {
        let config = testing::config();
        let h = harness(config.clone()).await;
        let mut state = PersistentState::default();
        state.current_state = StrategyState::MonitorPrice;
        state.position_id = Some(PositionId::new("4411"));
        h.store.save(id(), &state, 0).await.unwrap();

        h.runner.mark_complete().await.unwrap();
        let restarted = h.runner.restart().await.unwrap();
        assert_eq!(restarted.position_id, Some(PositionId::new("4411")));

        h.runner.tick().await.unwrap();
        let approve = h.outbox.last_submitted().await.unwrap();
        h.outbox
            .report(ActionOutcome::success(
                approve.id(),
                vec![ActionReceipt::Approve {
                    token: config.quote_token.address.clone(),
                    amount: TokenAmount::from(1_000_000_000u64),
                }],
            ))
            .await;
        h.runner.tick().await.unwrap();
        let swap = h.outbox.last_submitted().await.unwrap();
        h.outbox
            .report(ActionOutcome::success(
                swap.id(),
                vec![ActionReceipt::Swap {
                    token_in_symbol: "USDC".into(),
                    token_out_symbol: "WETH".into(),
                    amount_in: TokenAmount::from(500_000_000u64),
                    amount_out: TokenAmount::from(250_000_000_000_000_000u64),
                }],
            ))
            .await;
        h.runner.tick().await.unwrap();

        let provide = h.outbox.last_submitted().await.unwrap();
        assert_eq!(provide.step(), StrategyState::ProvideLiquidity);
        assert_eq!(
            provide.close_position().unwrap().position_id,
            PositionId::new("4411")
        );
        assert!(provide.open_position().is_some());
    }

    #[tokio::test]
    async fn test_mark_complete_refused_while_awaiting() {
        let h = harness(testing::config()).await;
        h.runner.tick().await.unwrap();

        assert!(matches!(
            h.runner.mark_complete().await,
            Err(StrategyError::NotCompletable { .. })
        ));
    }
}
