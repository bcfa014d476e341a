//! Rebalance trigger evaluation for the MONITOR_PRICE step.
//!
//! A [`RebalanceTrigger`] is a pure decision over a [`TriggerContext`]. The
//! [`TriggerEvaluator`] gathers that context from the market, runs the
//! configured policy and records the outcome in the persistent state.

use crate::error::StrategyResult;
use crate::steps::StepContext;
use chrono::{DateTime, Utc};
use clmm_cycle_domain::config::StrategyConfig;
use clmm_cycle_domain::enums::TriggerPolicy;
use clmm_cycle_domain::history::{PriceObservation, RebalanceRecord, TriggerReason};
use clmm_cycle_domain::state::PersistentState;
use clmm_cycle_domain::value_objects::{Price, PriceRange};
use rust_decimal::Decimal;
use tracing::{debug, info};

/// Observations a trigger policy decides on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerContext {
    /// Evaluation time.
    pub now: DateTime<Utc>,
    /// Current spot price.
    pub spot: Price,
    /// Bounds of the open position, if one is open and the policy asked.
    pub position_range: Option<PriceRange>,
    /// Time of the last confirmed position open.
    pub last_rebalance_time: Option<DateTime<Utc>>,
    /// Price the current position was opened around.
    pub reference_price: Option<Decimal>,
}

impl TriggerContext {
    /// Whole seconds since the last rebalance.
    pub fn elapsed_secs(&self) -> Option<i64> {
        self.last_rebalance_time
            .map(|last| (self.now - last).num_seconds())
    }
}

/// Result of a trigger evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerDecision {
    /// Keep the current position.
    Hold,
    /// Rebalance, for the given reason.
    Rebalance(TriggerReason),
}

impl TriggerDecision {
    pub fn is_rebalance(&self) -> bool {
        matches!(self, TriggerDecision::Rebalance(_))
    }
}

/// Trait for rebalance trigger policies.
pub trait RebalanceTrigger: Send + Sync {
    /// Decides whether to rebalance.
    fn evaluate(&self, context: &TriggerContext) -> TriggerDecision;

    /// Returns the name of the policy.
    fn name(&self) -> &'static str;

    /// Whether [`TriggerContext::position_range`] must be filled in.
    fn needs_position_bounds(&self) -> bool {
        false
    }
}

fn interval_elapsed(elapsed_secs: i64, interval_secs: u64) -> bool {
    i64::try_from(interval_secs).is_ok_and(|interval| elapsed_secs > interval)
}

/// Rebalances when spot leaves the open position, or when the rebalance
/// interval has elapsed.
#[derive(Debug, Clone)]
pub struct BoundsTrigger {
    /// Rebalance interval in seconds.
    pub interval_secs: u64,
}

impl RebalanceTrigger for BoundsTrigger {
    fn evaluate(&self, context: &TriggerContext) -> TriggerDecision {
        if let Some(range) = context.position_range {
            if !range.contains(context.spot) {
                return TriggerDecision::Rebalance(TriggerReason::PositionBounds {
                    current_price: context.spot.value,
                    lower_bound: range.lower_price.value,
                    upper_bound: range.upper_price.value,
                });
            }
        }

        if let Some(elapsed) = context.elapsed_secs() {
            if interval_elapsed(elapsed, self.interval_secs) {
                return TriggerDecision::Rebalance(TriggerReason::TimeInterval {
                    elapsed_secs: elapsed,
                    interval_secs: self.interval_secs,
                });
            }
        }

        TriggerDecision::Hold
    }

    fn name(&self) -> &'static str {
        "Position Bounds"
    }

    fn needs_position_bounds(&self) -> bool {
        true
    }
}

/// Rebalances on relative deviation from the reference price.
///
/// Deviation above `immediate_threshold` triggers at once; deviation above
/// `min_threshold` triggers only once the interval has elapsed or when no
/// rebalance has been recorded yet.
#[derive(Debug, Clone)]
pub struct DeviationTrigger {
    /// Deviation that triggers regardless of time (0.02 = 2%).
    pub immediate_threshold: Decimal,
    /// Deviation that triggers once the interval has elapsed.
    pub min_threshold: Decimal,
    /// Rebalance interval in seconds.
    pub interval_secs: u64,
}

impl DeviationTrigger {
    fn deviation(context: &TriggerContext) -> Option<(Decimal, Decimal)> {
        let reference = context.reference_price?;
        let deviation = context.spot.deviation_from(Price::new(reference))?;
        Some((reference, deviation))
    }
}

impl RebalanceTrigger for DeviationTrigger {
    fn evaluate(&self, context: &TriggerContext) -> TriggerDecision {
        let Some((reference, deviation)) = Self::deviation(context) else {
            return TriggerDecision::Hold;
        };

        if deviation > self.immediate_threshold {
            return TriggerDecision::Rebalance(TriggerReason::ImmediateDeviation {
                current_price: context.spot.value,
                reference_price: reference,
                deviation,
                threshold: self.immediate_threshold,
            });
        }

        if deviation > self.min_threshold {
            let elapsed = context.elapsed_secs();
            let due = elapsed.is_none_or(|e| interval_elapsed(e, self.interval_secs));
            if due {
                return TriggerDecision::Rebalance(TriggerReason::PeriodicDeviation {
                    current_price: context.spot.value,
                    reference_price: reference,
                    deviation,
                    threshold: self.min_threshold,
                    elapsed_secs: elapsed,
                });
            }
        }

        TriggerDecision::Hold
    }

    fn name(&self) -> &'static str {
        "Price Deviation"
    }
}

/// Runs the configured trigger policy against live data.
pub struct TriggerEvaluator {
    policy: TriggerPolicy,
    trigger: Box<dyn RebalanceTrigger>,
}

impl TriggerEvaluator {
    /// Selects the policy named by `config.trigger_policy`.
    pub fn from_config(config: &StrategyConfig) -> Self {
        let trigger: Box<dyn RebalanceTrigger> = match config.trigger_policy {
            TriggerPolicy::PositionBounds => Box::new(BoundsTrigger {
                interval_secs: config.rebalance_interval,
            }),
            TriggerPolicy::PriceDeviation => Box::new(DeviationTrigger {
                immediate_threshold: config.price_deviation_threshold,
                min_threshold: config.min_price_deviation,
                interval_secs: config.rebalance_interval,
            }),
        };
        Self {
            policy: config.trigger_policy,
            trigger,
        }
    }

    /// Evaluates the trigger and records the result in `state`.
    ///
    /// On a trigger a [`RebalanceRecord`] is appended. Otherwise the bounds
    /// policy refreshes `last_check_time`/`last_price` and the deviation
    /// policy appends a [`PriceObservation`].
    ///
    /// # Errors
    /// Returns [`crate::StrategyError::Market`] if market data is unavailable.
    pub async fn evaluate(
        &self,
        ctx: &StepContext<'_>,
        state: &mut PersistentState,
    ) -> StrategyResult<bool> {
        let spot = ctx.spot_price().await?;
        let position_range = match (&state.position_id, self.trigger.needs_position_bounds()) {
            (Some(position), true) => Some(ctx.position_bounds(position).await?),
            _ => None,
        };

        let context = TriggerContext {
            now: ctx.now,
            spot,
            position_range,
            last_rebalance_time: state.last_rebalance_time,
            reference_price: state.last_price,
        };

        match self.trigger.evaluate(&context) {
            TriggerDecision::Rebalance(reason) => {
                info!(
                    policy = self.trigger.name(),
                    trigger = reason.name(),
                    spot = %spot,
                    "Rebalance triggered"
                );
                state.rebalance_history.push(RebalanceRecord {
                    timestamp: ctx.now,
                    reason,
                });
                Ok(true)
            }
            TriggerDecision::Hold => {
                debug!(policy = self.trigger.name(), spot = %spot, "No rebalance trigger");
                match self.policy {
                    TriggerPolicy::PositionBounds => {
                        state.last_check_time = Some(ctx.now);
                        state.last_price = Some(spot.value);
                    }
                    TriggerPolicy::PriceDeviation => {
                        let deviation = context
                            .reference_price
                            .and_then(|r| spot.deviation_from(Price::new(r)));
                        state.price_history.push(PriceObservation {
                            timestamp: ctx.now,
                            price: spot.value,
                            reference_price: context.reference_price,
                            deviation,
                        });
                    }
                }
                Ok(false)
            }
        }
    }
}
