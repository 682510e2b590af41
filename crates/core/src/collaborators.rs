//! Interfaces of the collaborators the pricing pipeline is wired against
//!
//! Registries and price sources live outside the pipeline. They are injected
//! as `Arc<dyn Trait>` and must be safe to call from overlapping cycles.

use async_trait::async_trait;
use tokio::time::Instant;

use crate::{
    BlockLiquidityMetadata, CollaboratorResult, Dec, Denom, Height, Pool, PoolId, PricesResult,
    PricingOptions, RepricingResult, TokenValuationMap,
};

/// Resolves the `10^precision` scaling factor of a denom
pub trait ScalingFactorProvider: Send + Sync {
    fn scaling_factor(&self, denom: &str) -> CollaboratorResult<Dec>;
}

/// Upstream price oracle; one bulk call per pricing cycle
#[async_trait]
pub trait PriceSource: Send + Sync {
    async fn get_prices(
        &self,
        base_denoms: &[Denom],
        quote_denoms: &[Denom],
        options: PricingOptions,
    ) -> CollaboratorResult<PricesResult>;
}

/// Pool storage shared with the serving layer
#[async_trait]
pub trait PoolRegistry: Send + Sync {
    /// Returns the pools for the given IDs, failing if any is unknown
    async fn get_pools(&self, pool_ids: &[PoolId]) -> CollaboratorResult<Vec<Pool>>;

    async fn store_pools(&self, pools: Vec<Pool>) -> CollaboratorResult<()>;
}

/// Receives repriced token valuations. Fire-and-forget.
pub trait TokenValuationSink: Send + Sync {
    fn update_token_valuation(&self, updates: TokenValuationMap);
}

/// Consumer of a cycle's shared price map
#[async_trait]
pub trait PricingUpdateListener: Send + Sync {
    async fn on_pricing_update(
        &self,
        height: Height,
        metadata: &BlockLiquidityMetadata,
        prices: &PricesResult,
        quote_denom: &str,
        deadline: Instant,
    ) -> RepricingResult<()>;

    /// The cycle for `height` ran out of time before prices arrived.
    ///
    /// Nothing is repriced. Implementations with downstream observers should
    /// still tell them the height was processed.
    fn on_deadline_exceeded(&self, _height: Height) {}
}

/// Observer notified once pool liquidity for a height has been committed.
///
/// Called on a blocking thread off the pricing task, one height at a time in
/// commit order. Errors are logged by the caller and otherwise ignored.
pub trait PoolLiquidityComputeListener: Send + Sync {
    fn on_pool_liquidity_compute(&self, height: Height) -> anyhow::Result<()>;
}
