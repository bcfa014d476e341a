use crate::error::DomainError;
use crate::math::price_tick::tick_to_price_adjusted;
use crate::value_objects::price::Price;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Closed price interval `[lower, upper]` of a liquidity position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceRange {
    pub lower_price: Price,
    pub upper_price: Price,
}

impl PriceRange {
    pub fn new(lower: Price, upper: Price) -> Result<Self, DomainError> {
        if lower > upper {
            return Err(DomainError::InvalidRange {
                lower: lower.to_string(),
                upper: upper.to_string(),
            });
        }
        Ok(Self {
            lower_price: lower,
            upper_price: upper,
        })
    }

    /// Symmetric band `[p * (1 - width), p * (1 + width)]` around `center`.
    ///
    /// # Errors
    /// Returns [`DomainError::InvalidPrice`] if the upper bound overflows.
    pub fn around(center: Price, width: Decimal) -> Result<Self, DomainError> {
        let width = width.abs();
        let bound = |factor: Decimal| {
            center
                .value
                .checked_mul(factor)
                .map(Price::new)
                .ok_or_else(|| DomainError::InvalidPrice(format!("{center} * {factor} overflows")))
        };
        Self::new(bound(Decimal::ONE - width)?, bound(Decimal::ONE + width)?)
    }

    /// Range between two pool ticks, adjusted for token decimals.
    pub fn from_ticks(
        tick_lower: i32,
        tick_upper: i32,
        decimals0: u8,
        decimals1: u8,
    ) -> Result<Self, DomainError> {
        let lower = tick_to_price_adjusted(tick_lower, decimals0, decimals1)?;
        let upper = tick_to_price_adjusted(tick_upper, decimals0, decimals1)?;
        Self::new(Price::new(lower), Price::new(upper))
    }

    pub fn contains(&self, price: Price) -> bool {
        price.value >= self.lower_price.value && price.value <= self.upper_price.value
    }
}
