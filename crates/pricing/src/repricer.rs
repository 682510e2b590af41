//! Token and pool repricing for one block
//!
//! For every updated token the repricer derives a fresh valuation record,
//! guarded by a per-denom height watermark so a late cycle for an older block
//! never overwrites a newer one. Pools touched by the block get their
//! liquidity capitalization recomputed from the same price map.

use async_trait::async_trait;
use metrics::histogram;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant as StdInstant;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, error, info, warn};

use liqcap_core::{
    BlockLiquidityMetadata, Coin, Denom, DenomPriceInfo, Height, PoolId, PoolLiquidityComputeListener,
    PoolLiquiditySnapshot, PoolRegistry, PricesResult, PricingError, PricingUpdateListener,
    RepricingError, RepricingResult, ScalingFactorProvider, TokenValuationMap,
    TokenValuationRecord, TokenValuationSink,
};

use crate::{compute_coin_cap, ComputeNotifier, HeightWatermark, LiquidityPricer};

/// Denom prefix of pool share tokens
pub const SHARE_TOKEN_PREFIX: &str = "gamm/pool/";

/// Decides whether a denom is a pool share token, which is never priced directly
pub type ShareTokenFilter = Arc<dyn Fn(&str) -> bool + Send + Sync>;

pub fn default_share_token_filter() -> ShareTokenFilter {
    Arc::new(|denom: &str| denom.starts_with(SHARE_TOKEN_PREFIX))
}

/// Why an updated token produced no record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    ShareToken,
    MissingLiquidity,
    /// A later height is already committed
    Stale,
}

/// Outcome of evaluating one updated token
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenRepricing {
    Repriced(TokenValuationRecord),
    Skipped(SkipReason),
}

pub struct Repricer {
    pricer: LiquidityPricer,
    scaling_factors: Arc<dyn ScalingFactorProvider>,
    pools: Arc<dyn PoolRegistry>,
    valuations: Arc<dyn TokenValuationSink>,
    watermark: HeightWatermark,
    listeners: ComputeNotifier,
    is_share_token: ShareTokenFilter,
}

impl Repricer {
    pub fn new(
        default_quote_denom: impl Into<Denom>,
        scaling_factors: Arc<dyn ScalingFactorProvider>,
        pools: Arc<dyn PoolRegistry>,
        valuations: Arc<dyn TokenValuationSink>,
    ) -> Self {
        Self {
            pricer: LiquidityPricer::new(default_quote_denom, Arc::clone(&scaling_factors)),
            scaling_factors,
            pools,
            valuations,
            watermark: HeightWatermark::new(),
            listeners: ComputeNotifier::new(),
            is_share_token: default_share_token_filter(),
        }
    }

    pub fn with_share_token_filter(mut self, filter: ShareTokenFilter) -> Self {
        self.is_share_token = filter;
        self
    }

    pub fn pricer(&self) -> &LiquidityPricer {
        &self.pricer
    }

    pub fn register_listener(&self, listener: Arc<dyn PoolLiquidityComputeListener>) {
        self.listeners.register(listener);
    }

    /// Resolves once every pool liquidity notification queued so far was delivered
    pub async fn wait_for_listeners(&self) {
        self.listeners.wait_idle().await;
    }

    pub fn height_for_denom(&self, denom: &str) -> Option<Height> {
        self.watermark.get(denom)
    }

    /// Returns false if a later height was already stored
    pub fn store_height_for_denom(&self, denom: &str, height: Height) -> bool {
        self.watermark.commit_if_newer(denom, height)
    }

    pub fn has_later_update_than_height(&self, denom: &str, height: Height) -> bool {
        self.watermark.is_stale(denom, height)
    }

    /// Evaluates one updated token without committing anything.
    ///
    /// Price and numeric failures still produce a record, with a zero
    /// capitalization and the reason attached.
    pub fn create_token_valuation(
        &self,
        denom: &str,
        height: Height,
        metadata: &BlockLiquidityMetadata,
        prices: &PricesResult,
        quote_denom: &str,
    ) -> TokenRepricing {
        if (self.is_share_token)(denom) {
            return TokenRepricing::Skipped(SkipReason::ShareToken);
        }

        let Some(liquidity) = metadata.token_liquidity.get(denom) else {
            return TokenRepricing::Skipped(SkipReason::MissingLiquidity);
        };

        if self.has_later_update_than_height(denom, height) {
            return TokenRepricing::Skipped(SkipReason::Stale);
        }

        let total_liquidity = liquidity.total_liquidity;
        let price = prices.price_for(denom, quote_denom);
        if price.is_zero() {
            let reason = PricingError::ZeroPrice { denom: denom.to_string() };
            debug!(denom, height, "No price in block, recording zero capitalization");
            return TokenRepricing::Repriced(TokenValuationRecord::zero_cap(
                total_liquidity,
                height,
                reason.to_string(),
            ));
        }

        let scaling_factor = match self.scaling_factors.scaling_factor(denom) {
            Ok(scaling_factor) => scaling_factor,
            Err(e) => {
                debug!(denom, height, error = %e, "Recording zero capitalization");
                return TokenRepricing::Repriced(TokenValuationRecord::zero_cap(
                    total_liquidity,
                    height,
                    e.to_string(),
                ));
            }
        };

        let coin = Coin::new(denom, total_liquidity);
        let record = match compute_coin_cap(&coin, DenomPriceInfo { price, scaling_factor }) {
            Ok(cap) => TokenValuationRecord::priced(price, total_liquidity, cap.truncate_int(), height),
            Err(e) => {
                debug!(denom, height, error = %e, "Recording zero capitalization");
                TokenValuationRecord::zero_cap(total_liquidity, height, e.to_string())
            }
        };

        TokenRepricing::Repriced(record)
    }

    /// Reprices every updated token of the block and hands the batch to the
    /// valuation sink. Returns the records that were committed.
    pub fn reprice_denoms(
        &self,
        height: Height,
        metadata: &BlockLiquidityMetadata,
        prices: &PricesResult,
        quote_denom: &str,
    ) -> TokenValuationMap {
        let mut updates = TokenValuationMap::new();

        for denom in &metadata.updated_tokens {
            match self.create_token_valuation(denom, height, metadata, prices, quote_denom) {
                TokenRepricing::Repriced(record) => {
                    // A concurrent cycle may have committed a later height meanwhile
                    if self.watermark.commit_if_newer(denom, height) {
                        updates.insert(denom.clone(), record);
                    } else {
                        debug!(denom = %denom, height, "Dropping record overtaken by a later height");
                    }
                }
                TokenRepricing::Skipped(reason) => {
                    debug!(denom = %denom, height, ?reason, "Skipping token");
                }
            }
        }

        if !updates.is_empty() {
            self.valuations.update_token_valuation(updates.clone());
        }

        updates
    }

    /// Recomputes and stores the liquidity capitalization of the given pools
    pub async fn reprice_pool_liquidity_cap(
        &self,
        pool_ids: &BTreeSet<PoolId>,
        prices: &PricesResult,
        quote_denom: &str,
    ) -> RepricingResult<()> {
        if pool_ids.is_empty() {
            return Ok(());
        }

        let ids: Vec<PoolId> = pool_ids.iter().copied().collect();
        let mut pools = self.pools.get_pools(&ids).await?;

        for pool in &mut pools {
            let (cap, diagnostic) = self.pricer.price_balances_in(&pool.balances, prices, quote_denom);
            if !diagnostic.is_empty() {
                debug!(pool_id = pool.id, %diagnostic, "Pool capitalization is partial");
            }
            pool.set_liquidity(PoolLiquiditySnapshot::new(cap, diagnostic));
        }

        self.pools.store_pools(pools).await?;
        Ok(())
    }

}

impl std::fmt::Debug for Repricer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repricer")
            .field("pricer", &self.pricer)
            .field("tracked_denoms", &self.watermark.len())
            .field("listeners", &self.listeners.len())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl PricingUpdateListener for Repricer {
    async fn on_pricing_update(
        &self,
        height: Height,
        metadata: &BlockLiquidityMetadata,
        prices: &PricesResult,
        quote_denom: &str,
        deadline: Instant,
    ) -> RepricingResult<()> {
        let start = StdInstant::now();

        let work = async {
            let updates = self.reprice_denoms(height, metadata, prices, quote_denom);
            self.reprice_pool_liquidity_cap(&metadata.pool_ids, prices, quote_denom).await?;
            Ok::<_, RepricingError>(updates.len())
        };

        let result = match timeout_at(deadline, work).await {
            Ok(Ok(tokens)) => {
                info!(
                    height,
                    tokens,
                    pools = metadata.pool_ids.len(),
                    "Repriced liquidity"
                );
                Ok(())
            }
            Ok(Err(e)) => {
                error!(height, error = %e, "Repricing failed");
                histogram!("liqcap_repricing_duration_ms").record(start.elapsed().as_secs_f64() * 1000.0);
                return Err(e);
            }
            Err(_) => {
                warn!(height, "Repricing deadline exceeded, keeping committed work");
                Err(RepricingError::DeadlineExceeded { height })
            }
        };

        self.listeners.notify(height);
        histogram!("liqcap_repricing_duration_ms").record(start.elapsed().as_secs_f64() * 1000.0);

        result
    }

    fn on_deadline_exceeded(&self, height: Height) {
        warn!(height, "Prices for height never arrived, notifying without repricing");
        self.listeners.notify(height);
    }
}
