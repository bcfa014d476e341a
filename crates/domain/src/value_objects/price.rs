use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Price {
    pub value: Decimal,
}

impl Price {
    pub fn new(value: Decimal) -> Self {
        Self { value }
    }

    /// Relative distance from `reference`, `|self - reference| / reference`.
    ///
    /// `None` when the reference is not positive.
    pub fn deviation_from(&self, reference: Price) -> Option<Decimal> {
        if reference.value <= Decimal::ZERO {
            return None;
        }
        Some(((self.value - reference.value) / reference.value).abs())
    }
}

impl From<Decimal> for Price {
    fn from(value: Decimal) -> Self {
        Self { value }
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value)
    }
}
