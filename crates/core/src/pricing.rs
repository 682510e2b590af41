//! Options passed to the upstream price source

use serde::{Deserialize, Serialize};

/// Minimum pool liquidity option meaning "use the price source's own default"
pub const DEFAULT_MIN_POOL_LIQUIDITY_CAP: i64 = -1;

/// How prices should be obtained for a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingOptions {
    /// Recompute instead of serving cached prices
    pub recompute_prices: bool,
    /// Minimum pool liquidity capitalization a pool needs to be used for pricing
    pub min_pool_liquidity_cap: i64,
    /// The request comes from the per-block pricing worker
    pub is_worker_precompute: bool,
}

impl Default for PricingOptions {
    fn default() -> Self {
        Self {
            recompute_prices: false,
            min_pool_liquidity_cap: DEFAULT_MIN_POOL_LIQUIDITY_CAP,
            is_worker_precompute: false,
        }
    }
}

impl PricingOptions {
    pub fn with_recompute_prices(mut self) -> Self {
        self.recompute_prices = true;
        self
    }

    pub fn with_min_pool_liquidity_cap(mut self, min_cap: u64) -> Self {
        self.min_pool_liquidity_cap = i64::try_from(min_cap).unwrap_or(i64::MAX);
        self
    }

    pub fn with_worker_precompute(mut self) -> Self {
        self.is_worker_precompute = true;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_options() {
        let opts = PricingOptions::default()
            .with_recompute_prices()
            .with_min_pool_liquidity_cap(0)
            .with_worker_precompute();

        assert!(opts.recompute_prices);
        assert!(opts.is_worker_precompute);
        assert_eq!(opts.min_pool_liquidity_cap, 0);
        assert_eq!(PricingOptions::default().min_pool_liquidity_cap, DEFAULT_MIN_POOL_LIQUIDITY_CAP);
    }
}
