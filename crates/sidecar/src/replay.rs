//! Block replay
//!
//! Feeds recorded blocks through the scheduler one at a time, waiting for each
//! cycle, and reports the resulting valuations and pool snapshots.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

use liqcap_core::{
    BigDec, BlockLiquidityMetadata, Denom, Height, Pool, PoolLiquidityComputeListener,
    PoolRegistry, TokenValuationRecord,
};
use liqcap_pricing::Repricer;
use liqcap_scheduler::PricingScheduler;
use liqcap_state::{PoolStore, ScalingFactorRegistry, StaticPriceSource, TokenValuationRegistry};

use crate::SidecarConfig;

/// Recorded chain activity
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Scenario {
    /// Merged over the configured precisions
    #[serde(default)]
    pub token_precisions: HashMap<Denom, u32>,
    pub blocks: Vec<ScenarioBlock>,
}

impl Scenario {
    pub fn from_path(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading scenario {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("parsing scenario {}", path.display()))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScenarioBlock {
    pub height: Height,
    /// Quote-denominated prices effective from this block
    #[serde(default)]
    pub prices: HashMap<Denom, BigDec>,
    /// Pool states written before the block is priced
    #[serde(default)]
    pub pools: Vec<Pool>,
    #[serde(flatten)]
    pub metadata: BlockLiquidityMetadata,
}

/// Logs each committed height
#[derive(Debug, Default)]
pub struct LoggingListener {
    last_height: AtomicU64,
}

impl LoggingListener {
    pub fn last_height(&self) -> Height {
        self.last_height.load(Ordering::Relaxed)
    }
}

impl PoolLiquidityComputeListener for LoggingListener {
    fn on_pool_liquidity_compute(&self, height: Height) -> anyhow::Result<()> {
        self.last_height.fetch_max(height, Ordering::Relaxed);
        info!(height, "Pool liquidity committed");
        Ok(())
    }
}

/// Final state after a replay
#[derive(Debug, Clone, Serialize)]
pub struct ReplayReport {
    pub last_committed_height: Height,
    pub cycles_completed: u64,
    pub cycles_failed: u64,
    pub valuations: BTreeMap<Denom, TokenValuationRecord>,
    pub pools: Vec<Pool>,
}

#[derive(Debug)]
pub struct Replay {
    quote_denom: Denom,
    valuations: Arc<TokenValuationRegistry>,
    pools: Arc<PoolStore>,
    prices: Arc<StaticPriceSource>,
    listener: Arc<LoggingListener>,
    repricer: Arc<Repricer>,
    scheduler: PricingScheduler,
}

impl Replay {
    pub fn new(config: &SidecarConfig, scenario: &Scenario) -> anyhow::Result<Self> {
        let scaling_factors = ScalingFactorRegistry::from_precisions(
            config
                .pricing
                .token_precisions
                .iter()
                .chain(scenario.token_precisions.iter())
                .map(|(denom, precision)| (denom.clone(), *precision)),
        )
        .context("building scaling factors")?;

        let valuations = Arc::new(TokenValuationRegistry::new());
        let pools = Arc::new(PoolStore::new());
        let prices = Arc::new(StaticPriceSource::default());
        let listener = Arc::new(LoggingListener::default());

        let repricer = Arc::new(Repricer::new(
            config.pricing.default_quote_denom.clone(),
            Arc::new(scaling_factors),
            pools.clone(),
            valuations.clone(),
        ));
        repricer.register_listener(listener.clone());

        let scheduler = PricingScheduler::new(config.scheduler.clone(), &config.pricing, prices.clone());
        scheduler.register_listener(repricer.clone());

        Ok(Self {
            quote_denom: config.pricing.default_quote_denom.clone(),
            valuations,
            pools,
            prices,
            listener,
            repricer,
            scheduler,
        })
    }

    /// Applies one block and waits for its pricing cycle
    pub async fn run_block(&self, block: ScenarioBlock) -> anyhow::Result<()> {
        let height = block.height;

        if !block.pools.is_empty() {
            self.pools.store_pools(block.pools).await?;
        }
        for (denom, price) in block.prices {
            self.prices.set_price(denom, self.quote_denom.clone(), price);
        }

        match self.scheduler.trigger_async(height, block.metadata) {
            Some(handle) => handle
                .await
                .with_context(|| format!("pricing task for height {height}"))?,
            None => debug!(height, "Block merged into the running cycle"),
        }

        Ok(())
    }

    pub async fn run(&self, blocks: Vec<ScenarioBlock>) -> anyhow::Result<()> {
        let total = blocks.len();
        for block in blocks {
            self.run_block(block).await?;
        }
        self.repricer.wait_for_listeners().await;
        info!(blocks = total, "Replay complete");
        Ok(())
    }

    pub fn report(&self) -> ReplayReport {
        let stats = self.scheduler.stats();
        ReplayReport {
            last_committed_height: self.listener.last_height(),
            cycles_completed: stats.cycles_completed,
            cycles_failed: stats.cycles_failed,
            valuations: self.valuations.snapshot().into_iter().collect(),
            pools: self.pools.all(),
        }
    }
}
