//! In-memory collaborators for the liquidity pricing pipeline
//!
//! Features:
//! - Lock-free token valuation registry with a per-denom height guard
//! - Pool store shared between the serving path and repricing cycles
//! - Scaling factor registry built from token precisions
//! - Settable price source for replays and tests

pub mod feeds;
pub mod state;

pub use feeds::StaticPriceSource;
pub use state::{PoolStore, ScalingFactorRegistry, StateStats, TokenValuationRegistry};
