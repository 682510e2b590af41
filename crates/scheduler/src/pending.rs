//! Work accumulated while a coalescing cycle is in flight

use liqcap_core::{BlockLiquidityMetadata, Height};

/// Merged metadata of every trigger that arrived during the running cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingCycle {
    /// Highest height merged so far
    pub height: Height,
    pub metadata: BlockLiquidityMetadata,
}

impl PendingCycle {
    pub fn new(height: Height, metadata: BlockLiquidityMetadata) -> Self {
        Self { height, metadata }
    }

    /// Folds a trigger in. Liquidity figures from the higher height win.
    pub fn merge(&mut self, height: Height, metadata: BlockLiquidityMetadata) {
        if height >= self.height {
            self.metadata.merge_newer(metadata);
            self.height = height;
        } else {
            self.metadata.merge_older(metadata);
        }
    }
}

/// In-flight flag and pending work, always read and written together
#[derive(Debug, Default)]
pub(crate) struct CycleState {
    pub in_flight: bool,
    pub pending: Option<PendingCycle>,
}

impl CycleState {
    pub fn enqueue(&mut self, height: Height, metadata: BlockLiquidityMetadata) {
        match self.pending.as_mut() {
            Some(pending) => pending.merge(height, metadata),
            None => self.pending = Some(PendingCycle::new(height, metadata)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use liqcap_core::U256;

    #[test]
    fn test_out_of_order_triggers_keep_highest_height() {
        let mut state = CycleState::default();
        state.enqueue(5, BlockLiquidityMetadata::new().with_token("uosmo", U256::from(5u64)));
        state.enqueue(4, BlockLiquidityMetadata::new().with_token("uosmo", U256::from(4u64)).with_token("atom", U256::from(1u64)));
        state.enqueue(6, BlockLiquidityMetadata::new().with_pool(9));

        let pending = state.pending.take().unwrap();
        assert_eq!(pending.height, 6);
        assert_eq!(pending.metadata.token_liquidity["uosmo"].total_liquidity, U256::from(5u64));
        assert!(pending.metadata.updated_tokens.contains("atom"));
        assert!(pending.metadata.pool_ids.contains(&9));
    }
}
