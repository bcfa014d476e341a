//! Strategy configuration.
//!
//! Loaded once per deployment from a JSON document, validated, and never
//! mutated afterwards.

use crate::address::Address;
use crate::enums::{Chain, Network, Protocol, TriggerPolicy};
use crate::error::ConfigError;
use crate::token::{Token, TokenAmount};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Seed parameters for the first cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitializationConfig {
    /// Token the wallet is funded with; must be the quote token.
    pub initial_token: Address,
    /// Expected seed amount in raw units.
    pub initial_amount: TokenAmount,
    pub fee_tier: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategyConfig {
    pub id: String,
    pub network: Network,
    pub chain: Chain,
    pub protocol: Protocol,
    pub pool_address: Address,
    pub wallet_address: Address,
    /// Spender for the seed-token approval.
    pub router_address: Address,
    /// Asset the swap step buys; token0 of opened positions.
    pub base_token: Token,
    /// Seed asset; token1 of opened positions.
    pub quote_token: Token,
    #[serde(default = "defaults::fee_tier")]
    pub position_fee_tier: u32,
    /// Half-width of the position band as a fraction of spot (0.02 = ±2%).
    #[serde(default = "defaults::range_width")]
    pub range_width: Decimal,
    #[serde(default = "defaults::slippage")]
    pub slippage: Decimal,
    /// Added to the slippage tolerance for every retry of a step.
    #[serde(default = "defaults::slippage")]
    pub slippage_step: Decimal,
    #[serde(default = "defaults::max_slippage")]
    pub max_slippage: Decimal,
    /// Seconds.
    #[serde(default = "defaults::rebalance_interval")]
    pub rebalance_interval: u64,
    #[serde(default)]
    pub trigger_policy: TriggerPolicy,
    #[serde(default = "defaults::price_deviation_threshold")]
    pub price_deviation_threshold: Decimal,
    #[serde(default = "defaults::min_price_deviation")]
    pub min_price_deviation: Decimal,
    #[serde(default = "defaults::max_sadflow_retries")]
    pub max_sadflow_retries: u32,
    #[serde(default = "defaults::max_not_included_retries")]
    pub max_not_included_retries: u32,
    #[serde(default)]
    pub initiate_teardown: bool,
    #[serde(default)]
    pub pause_strategy: bool,
    pub initialization: InitializationConfig,
}

mod defaults {
    use rust_decimal::Decimal;

    pub fn fee_tier() -> u32 {
        500
    }
    pub fn range_width() -> Decimal {
        Decimal::new(2, 2)
    }
    pub fn slippage() -> Decimal {
        Decimal::new(5, 3)
    }
    pub fn max_slippage() -> Decimal {
        Decimal::new(3, 2)
    }
    pub fn rebalance_interval() -> u64 {
        3600
    }
    pub fn price_deviation_threshold() -> Decimal {
        Decimal::new(2, 2)
    }
    pub fn min_price_deviation() -> Decimal {
        Decimal::new(5, 3)
    }
    pub fn max_sadflow_retries() -> u32 {
        3
    }
    pub fn max_not_included_retries() -> u32 {
        5
    }
}

impl StrategyConfig {
    /// Parses and validates a JSON configuration document.
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a configuration file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    /// Cross-field checks that the type system does not cover.
    ///
    /// Address well-formedness is enforced when the addresses are parsed.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));

        if self.id.trim().is_empty() {
            return invalid("id must not be empty".into());
        }
        if self.base_token.address == self.quote_token.address {
            return invalid("base_token and quote_token must differ".into());
        }
        if self.initialization.initial_token != self.quote_token.address {
            return invalid(format!(
                "initialization.initial_token {} must be the quote token {}",
                self.initialization.initial_token, self.quote_token.address
            ));
        }
        if self.range_width <= Decimal::ZERO || self.range_width >= Decimal::ONE {
            return invalid(format!("range_width {} must be in (0, 1)", self.range_width));
        }
        if self.slippage < Decimal::ZERO || self.slippage_step < Decimal::ZERO {
            return invalid("slippage settings must not be negative".into());
        }
        if self.slippage > self.max_slippage {
            return invalid(format!(
                "slippage {} exceeds max_slippage {}",
                self.slippage, self.max_slippage
            ));
        }
        if self.rebalance_interval == 0 {
            return invalid("rebalance_interval must be positive".into());
        }
        if self.min_price_deviation <= Decimal::ZERO
            || self.min_price_deviation >= self.price_deviation_threshold
        {
            return invalid(format!(
                "min_price_deviation {} must be positive and below price_deviation_threshold {}",
                self.min_price_deviation, self.price_deviation_threshold
            ));
        }
        Ok(())
    }

    /// Slippage tolerance for the given retry attempt of a step.
    pub fn slippage_for_attempt(&self, retry_count: u32) -> Decimal {
        let escalated = self.slippage + self.slippage_step * Decimal::from(retry_count);
        escalated.min(self.max_slippage)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    pub(crate) const SAMPLE: &str = r#"{
        "id": "eth-usdc-base",
        "network": "MAINNET",
        "chain": "BASE",
        "protocol": "UNISWAP_V3",
        "pool_address": "0xd0b53D9277642d899DF5C87A3966A349A798F224",
        "wallet_address": "0x00000000000000000000000000000000000000a1",
        "router_address": "0x2626664c2603336E57B271c5C0b26F421741e481",
        "base_token": {
            "address": "0x4200000000000000000000000000000000000006",
            "symbol": "WETH",
            "decimals": 18
        },
        "quote_token": {
            "address": "0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913",
            "symbol": "USDC",
            "decimals": 6
        },
        "initialization": {
            "initial_token": "0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913",
            "initial_amount": "1000000000",
            "fee_tier": 500
        }
    }"#;

    #[test]
    fn test_defaults_applied() {
        let config = StrategyConfig::from_json_str(SAMPLE).unwrap();
        assert_eq!(config.position_fee_tier, 500);
        assert_eq!(config.rebalance_interval, 3600);
        assert_eq!(config.max_sadflow_retries, 3);
        assert_eq!(config.max_not_included_retries, 5);
        assert_eq!(config.range_width, dec!(0.02));
        assert_eq!(config.trigger_policy, TriggerPolicy::PositionBounds);
        assert!(!config.pause_strategy);
        assert!(!config.initiate_teardown);
    }

    #[test]
    fn test_malformed_address_rejected() {
        let raw = SAMPLE.replace(
            "0x4200000000000000000000000000000000000006",
            "0x4200000000000000000000000000000006",
        );
        assert!(matches!(
            StrategyConfig::from_json_str(&raw),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_unknown_enum_rejected() {
        let raw = SAMPLE.replace("\"BASE\"", "\"SOLANA\"");
        assert!(StrategyConfig::from_json_str(&raw).is_err());
    }

    #[test]
    fn test_seed_token_must_be_quote() {
        let raw = SAMPLE.replace(
            "\"initial_token\": \"0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913\"",
            "\"initial_token\": \"0x4200000000000000000000000000000000000006\"",
        );
        assert!(matches!(
            StrategyConfig::from_json_str(&raw),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_slippage_escalates_and_caps() {
        let config = StrategyConfig::from_json_str(SAMPLE).unwrap();
        assert_eq!(config.slippage_for_attempt(0), dec!(0.005));
        assert_eq!(config.slippage_for_attempt(2), dec!(0.015));
        assert_eq!(config.slippage_for_attempt(50), dec!(0.03));
    }
}
