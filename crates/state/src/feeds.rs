//! Price source implementations

use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

use liqcap_core::{
    BigDec, CollaboratorError, CollaboratorResult, Denom, PriceSource, PricesResult,
    PricingOptions,
};

/// Price source serving a table set by the caller.
///
/// Used by the replay binary, where prices come from the scenario file, and
/// by tests that need to count or fail fetches.
#[derive(Debug, Default)]
pub struct StaticPriceSource {
    prices: RwLock<PricesResult>,
    failure: RwLock<Option<String>>,
    last_options: RwLock<Option<PricingOptions>>,
    fetch_count: AtomicU64,
}

impl StaticPriceSource {
    pub fn new(prices: PricesResult) -> Self {
        Self {
            prices: RwLock::new(prices),
            ..Self::default()
        }
    }

    pub fn set_price(&self, base: impl Into<Denom>, quote: impl Into<Denom>, price: BigDec) {
        self.prices.write().set_price(base, quote, price);
    }

    /// Make every following fetch fail with `reason`, or succeed again with `None`
    pub fn set_failure(&self, reason: Option<String>) {
        *self.failure.write() = reason;
    }

    pub fn fetch_count(&self) -> u64 {
        self.fetch_count.load(Ordering::Relaxed)
    }

    /// Options passed to the most recent fetch
    pub fn last_options(&self) -> Option<PricingOptions> {
        *self.last_options.read()
    }
}

#[async_trait]
impl PriceSource for StaticPriceSource {
    async fn get_prices(
        &self,
        base_denoms: &[Denom],
        quote_denoms: &[Denom],
        options: PricingOptions,
    ) -> CollaboratorResult<PricesResult> {
        self.fetch_count.fetch_add(1, Ordering::Relaxed);
        *self.last_options.write() = Some(options);

        if let Some(reason) = self.failure.read().clone() {
            return Err(CollaboratorError::PriceSource(reason));
        }

        let table = self.prices.read();
        let mut result = PricesResult::new();
        for base in base_denoms {
            for quote in quote_denoms {
                let price = table.price_for(base, quote);
                if !price.is_zero() {
                    result.set_price(base.clone(), quote.clone(), price);
                }
            }
        }

        debug!(
            requested = base_denoms.len(),
            priced = result.len(),
            "Served prices"
        );

        Ok(result)
    }
}
