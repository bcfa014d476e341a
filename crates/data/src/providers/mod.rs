//! Market data provider port.

mod snapshot;

pub use snapshot::{MarketSnapshot, PositionEntry, SnapshotMarketData};

use anyhow::Result;
use async_trait::async_trait;
use clmm_cycle_domain::Address;
use clmm_cycle_domain::state::PositionId;
use clmm_cycle_domain::token::TokenAmount;
use clmm_cycle_domain::value_objects::{Price, PriceRange};

/// Read access to live market and position data.
///
/// Values are treated as authoritative for the current tick; freshness is
/// the implementation's concern.
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    /// Current spot price of the pool's token0 in token1 units.
    async fn spot_price(&self, pool: &Address) -> Result<Price>;

    /// Lower and upper price bounds of an open position.
    async fn position_bounds(&self, position: &PositionId) -> Result<PriceRange>;

    /// Raw balance of `token` held by `owner`.
    async fn token_balance(&self, token: &Address, owner: &Address) -> Result<TokenAmount>;
}
