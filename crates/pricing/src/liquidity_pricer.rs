//! Liquidity capitalization pricing
//!
//! Prices are quote per whole base unit, so the capitalization of a raw amount
//! is `amount * price / base_scaling_factor` whole quote units. The product is
//! formed in 512 bits before dividing so small prices never collapse to zero
//! early.

use ruint::aliases::{U256, U512};
use std::sync::Arc;
use tracing::debug;

use liqcap_core::{
    BigDec, Coin, Coins, Dec, DenomPriceInfo, Denom, PricesResult, PricingError, PricingResult,
    ScalingFactorProvider,
};

/// Joins per-denom entries of a pool's liquidity cap diagnostic
pub const LIQUIDITY_CAP_ERROR_SEPARATOR: &str = "; ";

/// Diagnostic entry for a coin whose capitalization came out as zero
pub fn format_liquidity_cap_error(denom: &str) -> String {
    format!("zero cap for denom ({denom})")
}

/// Capitalization of `coin` at `price_info`, in quote units with 18 fractional digits.
///
/// Unlike [`LiquidityPricer::price_coin`], every zero outcome that is not a
/// zero amount is an error, so callers can record why a value is missing.
pub fn compute_coin_cap(coin: &Coin, price_info: DenomPriceInfo) -> PricingResult<Dec> {
    if price_info.price.is_zero() {
        return Err(PricingError::ZeroPrice {
            denom: coin.denom.clone(),
        });
    }
    if price_info.scaling_factor.is_zero() {
        return Err(PricingError::ZeroScalingFactor {
            denom: coin.denom.clone(),
        });
    }

    // amount (integer) * price (10^36 scale) / scaling factor (10^18 scale)
    // leaves a 10^18-scaled mantissa, i.e. a Dec.
    let product = widen(coin.amount) * widen(price_info.price.raw());
    let cap_raw = product / widen(price_info.scaling_factor.raw());

    let cap = narrow(cap_raw)
        .map(Dec::from_raw)
        .ok_or_else(|| PricingError::Overflow {
            denom: coin.denom.clone(),
        })?;

    if cap.is_zero() && !coin.amount.is_zero() {
        return Err(PricingError::TruncatedToZero {
            denom: coin.denom.clone(),
            amount: coin.amount.to_string(),
        });
    }

    Ok(cap)
}

fn widen(value: U256) -> U512 {
    let mut limbs = [0u64; 8];
    limbs[..4].copy_from_slice(value.as_limbs());
    U512::from_limbs(limbs)
}

fn narrow(value: U512) -> Option<U256> {
    let limbs = value.as_limbs();
    if limbs[4..].iter().any(|limb| *limb != 0) {
        return None;
    }
    Some(U256::from_limbs([limbs[0], limbs[1], limbs[2], limbs[3]]))
}

/// Values coins and pool balances in the default quote denom
#[derive(Clone)]
pub struct LiquidityPricer {
    default_quote_denom: Denom,
    scaling_factors: Arc<dyn ScalingFactorProvider>,
}

impl LiquidityPricer {
    pub fn new(
        default_quote_denom: impl Into<Denom>,
        scaling_factors: Arc<dyn ScalingFactorProvider>,
    ) -> Self {
        Self {
            default_quote_denom: default_quote_denom.into(),
            scaling_factors,
        }
    }

    pub fn quote_denom(&self) -> &str {
        &self.default_quote_denom
    }

    /// Whole quote units for `coin` at `price`.
    ///
    /// Returns zero when the price is zero, the scaling factor is unknown, or
    /// the value cannot be represented.
    pub fn price_coin(&self, coin: &Coin, price: BigDec) -> U256 {
        if price.is_zero() {
            debug!(denom = %coin.denom, "Zero price, capitalization is zero");
            return U256::ZERO;
        }

        let scaling_factor = match self.scaling_factors.scaling_factor(&coin.denom) {
            Ok(scaling_factor) => scaling_factor,
            Err(e) => {
                debug!(denom = %coin.denom, error = %e, "No scaling factor, capitalization is zero");
                return U256::ZERO;
            }
        };

        match compute_coin_cap(coin, DenomPriceInfo { price, scaling_factor }) {
            Ok(cap) => cap.truncate_int(),
            Err(e) => {
                debug!(denom = %coin.denom, error = %e, "Capitalization is zero");
                U256::ZERO
            }
        }
    }

    /// Sums the capitalization of every coin in `balances` in the default quote denom.
    ///
    /// Coins valued at zero are reported in the returned diagnostic, one
    /// [`format_liquidity_cap_error`] entry each, and otherwise skipped.
    pub fn price_balances(&self, balances: &Coins, prices: &PricesResult) -> (U256, String) {
        self.price_balances_in(balances, prices, &self.default_quote_denom)
    }

    /// [`LiquidityPricer::price_balances`] against an explicit quote denom
    pub fn price_balances_in(
        &self,
        balances: &Coins,
        prices: &PricesResult,
        quote_denom: &str,
    ) -> (U256, String) {
        let mut total = U256::ZERO;
        let mut errors = Vec::new();

        for coin in balances.iter() {
            let price = prices.price_for(&coin.denom, quote_denom);
            let cap = self.price_coin(&coin, price);

            if cap.is_zero() {
                errors.push(format_liquidity_cap_error(&coin.denom));
                continue;
            }

            total = total.saturating_add(cap);
        }

        (total, errors.join(LIQUIDITY_CAP_ERROR_SEPARATOR))
    }
}

impl std::fmt::Debug for LiquidityPricer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiquidityPricer")
            .field("default_quote_denom", &self.default_quote_denom)
            .finish_non_exhaustive()
    }
}
