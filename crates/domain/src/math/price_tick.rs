use crate::error::DomainError;
use rust_decimal::Decimal;
use rust_decimal::prelude::*;

/// Lowest tick a Uniswap V3 style pool accepts.
pub const MIN_TICK: i32 = -887_272;
/// Highest tick a Uniswap V3 style pool accepts.
pub const MAX_TICK: i32 = 887_272;

const TICK_BASE: f64 = 1.0001;

/// Returns the raw price for a tick, `P = 1.0001 ^ tick`.
///
/// The result is not adjusted for token decimals; see
/// [`tick_to_price_adjusted`].
pub fn tick_to_price(tick: i32) -> Result<Decimal, DomainError> {
    if !(MIN_TICK..=MAX_TICK).contains(&tick) {
        return Err(DomainError::InvalidTick(tick));
    }
    Decimal::from_f64(TICK_BASE.powi(tick)).ok_or(DomainError::InvalidTick(tick))
}

/// Price of token0 in token1 units, scaled by `10^(decimals0 - decimals1)`.
pub fn tick_to_price_adjusted(
    tick: i32,
    decimals0: u8,
    decimals1: u8,
) -> Result<Decimal, DomainError> {
    let raw = tick_to_price(tick)?.to_f64().ok_or(DomainError::InvalidTick(tick))?;
    let scale = 10f64.powi(i32::from(decimals0) - i32::from(decimals1));
    Decimal::from_f64(raw * scale).ok_or(DomainError::InvalidTick(tick))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tick_to_price() {
        assert_eq!(tick_to_price(0).unwrap(), Decimal::from(1));

        // 1.0001^100 ~= 1.010049
        let p100 = tick_to_price(100).unwrap();
        let diff = (p100.to_f64().unwrap() - 1.01004966).abs();
        assert!(diff < 0.000001);
    }

    #[test]
    fn test_tick_out_of_bounds() {
        assert_eq!(tick_to_price(MAX_TICK + 1), Err(DomainError::InvalidTick(MAX_TICK + 1)));
    }

    #[test]
    fn test_adjusted_price_for_weth_usdc() {
        // token0 = WETH (18), token1 = USDC (6); raw price 2e-9 ~ tick -200312
        let price = tick_to_price_adjusted(-200_312, 18, 6).unwrap().to_f64().unwrap();
        assert!((price - 2000.0).abs() < 1.0);
    }
}
