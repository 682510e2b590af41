//! Liquidity capitalization pipeline
//!
//! - `liquidity_pricer`: truncation-aware valuation of coins and balances
//! - `watermark`: per-denom highest committed height
//! - `repricer`: token and pool repricing for one block's price map
//! - `listeners`: append-only observer lists
//! - `notifier`: off-task delivery of pool liquidity notifications

pub mod listeners;
pub mod liquidity_pricer;
pub mod notifier;
pub mod repricer;
pub mod watermark;

pub use listeners::ListenerRegistry;
pub use liquidity_pricer::{
    compute_coin_cap, format_liquidity_cap_error, LiquidityPricer, LIQUIDITY_CAP_ERROR_SEPARATOR,
};
pub use notifier::ComputeNotifier;
pub use repricer::{
    default_share_token_filter, Repricer, ShareTokenFilter, SkipReason, TokenRepricing,
    SHARE_TOKEN_PREFIX,
};
pub use watermark::HeightWatermark;
