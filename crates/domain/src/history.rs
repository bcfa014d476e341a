//! Append-only diagnostic records kept in the persistent state.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Which condition fired a rebalance, with the values observed at the time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "trigger", rename_all = "snake_case")]
pub enum TriggerReason {
    /// Spot price left the open position's range.
    PositionBounds {
        current_price: Decimal,
        lower_bound: Decimal,
        upper_bound: Decimal,
    },
    /// Rebalance interval elapsed.
    TimeInterval {
        elapsed_secs: i64,
        interval_secs: u64,
    },
    /// Deviation above the immediate threshold.
    ImmediateDeviation {
        current_price: Decimal,
        reference_price: Decimal,
        deviation: Decimal,
        threshold: Decimal,
    },
    /// Deviation above the minimum threshold once the interval elapsed.
    PeriodicDeviation {
        current_price: Decimal,
        reference_price: Decimal,
        deviation: Decimal,
        threshold: Decimal,
        elapsed_secs: Option<i64>,
    },
}

impl TriggerReason {
    pub fn name(&self) -> &'static str {
        match self {
            TriggerReason::PositionBounds { .. } => "position_bounds",
            TriggerReason::TimeInterval { .. } => "time_interval",
            TriggerReason::ImmediateDeviation { .. } => "immediate_deviation",
            TriggerReason::PeriodicDeviation { .. } => "periodic_deviation",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RebalanceRecord {
    pub timestamp: DateTime<Utc>,
    pub reason: TriggerReason,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceObservation {
    pub timestamp: DateTime<Utc>,
    pub price: Decimal,
    pub reference_price: Option<Decimal>,
    pub deviation: Option<Decimal>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_trigger_reason_tag_matches_name() {
        let reason = TriggerReason::PositionBounds {
            current_price: dec!(2300),
            lower_bound: dec!(1800),
            upper_bound: dec!(2200),
        };
        let json = serde_json::to_value(&reason).unwrap();
        assert_eq!(json["trigger"], reason.name());
        assert_eq!(json["current_price"], "2300");
    }
}
