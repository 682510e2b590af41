//! Pool records as seen by the pricing pipeline

use ruint::aliases::U256;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::amount_serde;
use crate::{Coins, PoolId};

/// Pool model families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoolType {
    Balancer,
    StableSwap,
    Concentrated,
    CosmWasm,
}

impl PoolType {
    pub fn name(&self) -> &'static str {
        match self {
            PoolType::Balancer => "balancer",
            PoolType::StableSwap => "stableswap",
            PoolType::Concentrated => "concentrated",
            PoolType::CosmWasm => "cosmwasm",
        }
    }
}

impl fmt::Display for PoolType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Liquidity capitalization of a pool, recomputed every block it changes in
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolLiquiditySnapshot {
    #[serde(with = "amount_serde")]
    pub liquidity_cap: U256,
    /// Every per-token failure seen while pricing the balances
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub liquidity_cap_error: Option<String>,
}

impl PoolLiquiditySnapshot {
    /// Builds a snapshot from a best-effort total and its diagnostic string
    pub fn new(liquidity_cap: U256, diagnostic: String) -> Self {
        Self {
            liquidity_cap,
            liquidity_cap_error: (!diagnostic.is_empty()).then_some(diagnostic),
        }
    }
}

/// Pool record held by the pool registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pool {
    pub id: PoolId,
    pub pool_type: PoolType,
    pub balances: Coins,
    #[serde(default)]
    pub liquidity: PoolLiquiditySnapshot,
}

impl Pool {
    pub fn new(id: PoolId, pool_type: PoolType, balances: Coins) -> Self {
        Self {
            id,
            pool_type,
            balances,
            liquidity: PoolLiquiditySnapshot::default(),
        }
    }

    pub fn set_liquidity(&mut self, snapshot: PoolLiquiditySnapshot) {
        self.liquidity = snapshot;
    }

    pub fn liquidity_cap(&self) -> U256 {
        self.liquidity.liquidity_cap
    }

    pub fn liquidity_cap_error(&self) -> Option<&str> {
        self.liquidity.liquidity_cap_error.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Coin;

    #[test]
    fn test_snapshot_drops_empty_diagnostic() {
        let clean = PoolLiquiditySnapshot::new(U256::from(10u64), String::new());
        assert!(clean.liquidity_cap_error.is_none());

        let erred = PoolLiquiditySnapshot::new(U256::ZERO, "zero cap for denom (atom)".to_string());
        assert_eq!(erred.liquidity_cap_error.as_deref(), Some("zero cap for denom (atom)"));
    }

    #[test]
    fn test_pool_deserializes_without_snapshot() {
        let json = r#"{
            "id": 1,
            "pool_type": "balancer",
            "balances": [{"denom": "uosmo", "amount": "100"}, {"denom": "atom", "amount": "5"}]
        }"#;
        let pool: Pool = serde_json::from_str(json).unwrap();

        assert_eq!(pool.pool_type, PoolType::Balancer);
        assert_eq!(pool.liquidity_cap(), U256::ZERO);
        assert_eq!(
            pool.balances,
            Coins::new(vec![Coin::from_u128("atom", 5), Coin::from_u128("uosmo", 100)])
        );
    }
}
