//! Lock-free registry state
//!
//! Uses DashMap for concurrent reads/writes with minimal contention

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::debug;

use liqcap_core::{
    CollaboratorError, CollaboratorResult, Dec, DecimalResult, Denom, Pool, PoolId, PoolRegistry,
    ScalingFactorProvider, TokenValuationMap, TokenValuationRecord, TokenValuationSink,
};

/// Update counter and freshness shared by the registries
#[derive(Debug)]
struct UpdateTracker {
    update_count: AtomicU64,
    last_update: RwLock<Instant>,
}

impl UpdateTracker {
    fn new() -> Self {
        Self {
            update_count: AtomicU64::new(0),
            last_update: RwLock::new(Instant::now()),
        }
    }

    fn record(&self, count: u64) {
        self.update_count.fetch_add(count, Ordering::Relaxed);
        *self.last_update.write() = Instant::now();
    }

    fn stats(&self, entry_count: usize) -> StateStats {
        StateStats {
            entry_count,
            update_count: self.update_count.load(Ordering::Relaxed),
            last_update_age: self.last_update.read().elapsed(),
        }
    }
}

/// Token valuations served to route search, keyed by denom
#[derive(Debug)]
pub struct TokenValuationRegistry {
    records: DashMap<Denom, TokenValuationRecord>,
    tracker: UpdateTracker,
}

impl TokenValuationRegistry {
    pub fn new() -> Self {
        Self {
            records: DashMap::new(),
            tracker: UpdateTracker::new(),
        }
    }

    /// Stores `record` unless a record from a later height is already present.
    /// Returns whether the record was applied.
    pub fn upsert(&self, denom: Denom, record: TokenValuationRecord) -> bool {
        match self.records.entry(denom) {
            Entry::Occupied(mut existing) => {
                if existing.get().height > record.height {
                    debug!(
                        denom = %existing.key(),
                        stored_height = existing.get().height,
                        height = record.height,
                        "Ignoring valuation from an earlier height"
                    );
                    return false;
                }
                existing.insert(record);
            }
            Entry::Vacant(slot) => {
                slot.insert(record);
            }
        }
        true
    }

    pub fn get(&self, denom: &str) -> Option<TokenValuationRecord> {
        self.records.get(denom).map(|r| r.value().clone())
    }

    /// Copy of every record (for reporting)
    pub fn snapshot(&self) -> HashMap<Denom, TokenValuationRecord> {
        self.records
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect()
    }

    pub fn stats(&self) -> StateStats {
        self.tracker.stats(self.records.len())
    }
}

impl Default for TokenValuationRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenValuationSink for TokenValuationRegistry {
    fn update_token_valuation(&self, updates: TokenValuationMap) {
        let applied = updates
            .into_iter()
            .filter(|(denom, record)| self.upsert(denom.clone(), record.clone()))
            .count();

        self.tracker.record(applied as u64);
    }
}

/// Pools indexed by ID
#[derive(Debug)]
pub struct PoolStore {
    pools: DashMap<PoolId, Pool>,
    tracker: UpdateTracker,
}

impl PoolStore {
    pub fn new() -> Self {
        Self {
            pools: DashMap::new(),
            tracker: UpdateTracker::new(),
        }
    }

    /// Insert or replace a pool
    pub fn insert(&self, pool: Pool) {
        self.pools.insert(pool.id, pool);
        self.tracker.record(1);
    }

    pub fn get(&self, pool_id: PoolId) -> Option<Pool> {
        self.pools.get(&pool_id).map(|r| r.value().clone())
    }

    /// All pools ordered by ID
    pub fn all(&self) -> Vec<Pool> {
        let mut pools: Vec<Pool> = self.pools.iter().map(|e| e.value().clone()).collect();
        pools.sort_by_key(|p| p.id);
        pools
    }

    pub fn stats(&self) -> StateStats {
        self.tracker.stats(self.pools.len())
    }
}

impl Default for PoolStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PoolRegistry for PoolStore {
    async fn get_pools(&self, pool_ids: &[PoolId]) -> CollaboratorResult<Vec<Pool>> {
        pool_ids
            .iter()
            .map(|id| self.get(*id).ok_or(CollaboratorError::PoolNotFound(*id)))
            .collect()
    }

    async fn store_pools(&self, pools: Vec<Pool>) -> CollaboratorResult<()> {
        let count = pools.len() as u64;
        for pool in pools {
            self.pools.insert(pool.id, pool);
        }
        self.tracker.record(count);
        Ok(())
    }
}

/// Scaling factors per denom
#[derive(Debug, Default)]
pub struct ScalingFactorRegistry {
    factors: DashMap<Denom, Dec>,
}

impl ScalingFactorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry from a `denom -> decimal precision` table
    pub fn from_precisions<D: Into<Denom>>(
        precisions: impl IntoIterator<Item = (D, u32)>,
    ) -> DecimalResult<Self> {
        let registry = Self::new();
        for (denom, precision) in precisions {
            registry.set_precision(denom, precision)?;
        }
        Ok(registry)
    }

    /// Fails without touching the registry if `10^precision` does not fit
    pub fn set_precision(&self, denom: impl Into<Denom>, precision: u32) -> DecimalResult<()> {
        let factor = Dec::from_precision(precision)?;
        self.factors.insert(denom.into(), factor);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.factors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factors.is_empty()
    }
}

impl ScalingFactorProvider for ScalingFactorRegistry {
    fn scaling_factor(&self, denom: &str) -> CollaboratorResult<Dec> {
        self.factors
            .get(denom)
            .map(|r| *r.value())
            .ok_or_else(|| CollaboratorError::ScalingFactorNotFound(denom.to_string()))
    }
}

/// Statistics about a registry
#[derive(Debug, Clone)]
pub struct StateStats {
    pub entry_count: usize,
    pub update_count: u64,
    pub last_update_age: Duration,
}
