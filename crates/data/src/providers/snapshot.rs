//! Market data served from a JSON snapshot.
//!
//! The DEX adapter that reads pools on-chain lives outside this workspace;
//! it (or an operator) writes a snapshot file that the CLI host loads for
//! each tick. Tests build snapshots in memory.

use super::MarketDataProvider;
use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use clmm_cycle_domain::Address;
use clmm_cycle_domain::state::PositionId;
use clmm_cycle_domain::token::TokenAmount;
use clmm_cycle_domain::value_objects::{Price, PriceRange};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tokio::sync::RwLock;
use tracing::debug;

/// Bounds of an open position, either as prices or as pool ticks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PositionEntry {
    Prices {
        lower: Decimal,
        upper: Decimal,
    },
    Ticks {
        tick_lower: i32,
        tick_upper: i32,
        decimals0: u8,
        decimals1: u8,
    },
}

impl PositionEntry {
    fn range(&self) -> Result<PriceRange> {
        let range = match *self {
            PositionEntry::Prices { lower, upper } => {
                PriceRange::new(Price::new(lower), Price::new(upper))?
            }
            PositionEntry::Ticks {
                tick_lower,
                tick_upper,
                decimals0,
                decimals1,
            } => PriceRange::from_ticks(tick_lower, tick_upper, decimals0, decimals1)?,
        };
        Ok(range)
    }
}

/// Point-in-time view of the market.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarketSnapshot {
    /// Spot price by pool address.
    #[serde(default)]
    pub spot_prices: HashMap<Address, Decimal>,
    /// Position bounds by position id.
    #[serde(default)]
    pub positions: HashMap<PositionId, PositionEntry>,
    /// Balances by owner, then token.
    #[serde(default)]
    pub balances: HashMap<Address, HashMap<Address, TokenAmount>>,
}

/// [`MarketDataProvider`] backed by a [`MarketSnapshot`].
pub struct SnapshotMarketData {
    snapshot: RwLock<MarketSnapshot>,
}

impl SnapshotMarketData {
    pub fn new(snapshot: MarketSnapshot) -> Self {
        Self {
            snapshot: RwLock::new(snapshot),
        }
    }

    /// Loads a snapshot from a JSON file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("reading market snapshot {}", path.display()))?;
        let snapshot: MarketSnapshot = serde_json::from_str(&raw)
            .with_context(|| format!("parsing market snapshot {}", path.display()))?;
        Ok(Self::new(snapshot))
    }

    pub async fn set_spot_price(&self, pool: Address, price: Decimal) {
        self.snapshot.write().await.spot_prices.insert(pool, price);
    }

    pub async fn set_position(&self, id: PositionId, entry: PositionEntry) {
        self.snapshot.write().await.positions.insert(id, entry);
    }

    pub async fn remove_position(&self, id: &PositionId) {
        self.snapshot.write().await.positions.remove(id);
    }

    pub async fn set_balance(&self, owner: Address, token: Address, amount: TokenAmount) {
        self.snapshot
            .write()
            .await
            .balances
            .entry(owner)
            .or_default()
            .insert(token, amount);
    }
}

#[async_trait]
impl MarketDataProvider for SnapshotMarketData {
    async fn spot_price(&self, pool: &Address) -> Result<Price> {
        let snapshot = self.snapshot.read().await;
        let price = snapshot
            .spot_prices
            .get(pool)
            .copied()
            .ok_or_else(|| anyhow!("no spot price for pool {pool}"))?;
        debug!(pool = %pool, price = %price, "Spot price read");
        Ok(Price::new(price))
    }

    async fn position_bounds(&self, position: &PositionId) -> Result<PriceRange> {
        let snapshot = self.snapshot.read().await;
        snapshot
            .positions
            .get(position)
            .ok_or_else(|| anyhow!("unknown position {position}"))?
            .range()
    }

    async fn token_balance(&self, token: &Address, owner: &Address) -> Result<TokenAmount> {
        let snapshot = self.snapshot.read().await;
        Ok(snapshot
            .balances
            .get(owner)
            .and_then(|tokens| tokens.get(token))
            .copied()
            .unwrap_or_else(TokenAmount::zero))
    }
}
