//! Per-block liquidity metadata produced by ingestion

use ruint::aliases::U256;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

use crate::types::amount_serde;
use crate::{Denom, PoolId};

/// Liquidity of a denom summed across every pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DenomLiquidityData {
    #[serde(with = "amount_serde")]
    pub total_liquidity: U256,
}

impl DenomLiquidityData {
    pub fn new(total_liquidity: U256) -> Self {
        Self { total_liquidity }
    }
}

/// What changed in a block, as far as pricing is concerned
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockLiquidityMetadata {
    /// Denoms whose liquidity changed within the block
    #[serde(default)]
    pub updated_tokens: BTreeSet<Denom>,
    /// Raw total liquidity per denom at this block
    #[serde(default)]
    pub token_liquidity: HashMap<Denom, DenomLiquidityData>,
    /// Pools updated within the block
    #[serde(default)]
    pub pool_ids: BTreeSet<PoolId>,
}

impl BlockLiquidityMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks `denom` as updated with the given total liquidity
    pub fn with_token(mut self, denom: impl Into<Denom>, total_liquidity: U256) -> Self {
        let denom = denom.into();
        self.token_liquidity
            .insert(denom.clone(), DenomLiquidityData::new(total_liquidity));
        self.updated_tokens.insert(denom);
        self
    }

    pub fn with_pool(mut self, pool_id: PoolId) -> Self {
        self.pool_ids.insert(pool_id);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.updated_tokens.is_empty() && self.pool_ids.is_empty()
    }

    /// Folds in metadata from a later block; its liquidity figures win.
    pub fn merge_newer(&mut self, newer: BlockLiquidityMetadata) {
        self.updated_tokens.extend(newer.updated_tokens);
        self.token_liquidity.extend(newer.token_liquidity);
        self.pool_ids.extend(newer.pool_ids);
    }

    /// Folds in metadata from an earlier block; existing liquidity figures win.
    pub fn merge_older(&mut self, older: BlockLiquidityMetadata) {
        self.updated_tokens.extend(older.updated_tokens);
        for (denom, data) in older.token_liquidity {
            self.token_liquidity.entry(denom).or_insert(data);
        }
        self.pool_ids.extend(older.pool_ids);
    }
}
