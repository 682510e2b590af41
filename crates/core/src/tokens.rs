//! Token prices and valuation records

use ruint::aliases::U256;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::types::amount_serde;
use crate::{BigDec, Dec, Denom, Height};

/// Price and scaling factor of a base denom, built fresh for each cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DenomPriceInfo {
    /// Quote per whole base unit
    pub price: BigDec,
    /// 10^precision of the base denom
    pub scaling_factor: Dec,
}

/// Prices keyed by base denom, then quote denom
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PricesResult(HashMap<Denom, HashMap<Denom, BigDec>>);

impl PricesResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_price(&mut self, base: impl Into<Denom>, quote: impl Into<Denom>, price: BigDec) {
        self.0
            .entry(base.into())
            .or_default()
            .insert(quote.into(), price);
    }

    pub fn with_price(mut self, base: impl Into<Denom>, quote: impl Into<Denom>, price: BigDec) -> Self {
        self.set_price(base, quote, price);
        self
    }

    /// Price of `base` in `quote`, zero when absent
    pub fn price_for(&self, base: &str, quote: &str) -> BigDec {
        self.0
            .get(base)
            .and_then(|quotes| quotes.get(quote))
            .copied()
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn base_denoms(&self) -> impl Iterator<Item = &Denom> {
        self.0.keys()
    }
}

/// Valuation of a token across all pools, as served to route search
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenValuationRecord {
    pub price: BigDec,
    #[serde(with = "amount_serde")]
    pub total_liquidity: U256,
    /// Whole quote units, truncated
    #[serde(with = "amount_serde")]
    pub total_liquidity_cap: U256,
    pub height: Height,
    /// Why the capitalization is zero, when it could not be derived
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub liquidity_cap_error: Option<String>,
}

impl TokenValuationRecord {
    pub fn priced(price: BigDec, total_liquidity: U256, total_liquidity_cap: U256, height: Height) -> Self {
        Self {
            price,
            total_liquidity,
            total_liquidity_cap,
            height,
            liquidity_cap_error: None,
        }
    }

    /// Explicit zero-cap fallback with a diagnostic
    pub fn zero_cap(total_liquidity: U256, height: Height, reason: impl Into<String>) -> Self {
        Self {
            price: BigDec::zero(),
            total_liquidity,
            total_liquidity_cap: U256::ZERO,
            height,
            liquidity_cap_error: Some(reason.into()),
        }
    }
}

/// Batch of valuation records keyed by denom
pub type TokenValuationMap = HashMap<Denom, TokenValuationRecord>;
