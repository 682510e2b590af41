//! Pricing scheduler
//!
//! One trigger per block. A cycle fetches prices once for the block's updated
//! tokens, then hands the shared price map to every registered listener under
//! a single deadline.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, error, info, warn};

use liqcap_core::{
    BlockLiquidityMetadata, Denom, Height, PriceSource, PricingConfig, PricingOptions,
    PricingUpdateListener, SchedulerConfig, SchedulingMode,
};
use liqcap_pricing::ListenerRegistry;

use crate::metrics::{record_cycle_duration, record_cycle_error, record_trigger_coalesced};
use crate::pending::{CycleState, PendingCycle};

/// Scheduler counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    pub triggers: u64,
    pub coalesced: u64,
    pub cycles_completed: u64,
    pub cycles_failed: u64,
}

#[derive(Debug, Default)]
struct Counters {
    triggers: AtomicU64,
    coalesced: AtomicU64,
    cycles_completed: AtomicU64,
    cycles_failed: AtomicU64,
}

struct Inner {
    config: SchedulerConfig,
    quote_denom: Denom,
    min_pool_liquidity_cap: u64,
    price_source: Arc<dyn PriceSource>,
    listeners: ListenerRegistry<dyn PricingUpdateListener>,
    state: Mutex<CycleState>,
    counters: Counters,
}

/// Schedules pricing cycles off the caller's task. Cheap to clone.
#[derive(Clone)]
pub struct PricingScheduler {
    inner: Arc<Inner>,
}

impl PricingScheduler {
    pub fn new(
        config: SchedulerConfig,
        pricing: &PricingConfig,
        price_source: Arc<dyn PriceSource>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                quote_denom: pricing.default_quote_denom.clone(),
                min_pool_liquidity_cap: pricing.worker_min_pool_liquidity_cap,
                price_source,
                listeners: ListenerRegistry::new(),
                state: Mutex::new(CycleState::default()),
                counters: Counters::default(),
            }),
        }
    }

    pub fn register_listener(&self, listener: Arc<dyn PricingUpdateListener>) {
        self.inner.listeners.register(listener);
    }

    /// Starts a pricing cycle for `height` without waiting for it.
    ///
    /// Returns the spawned task, or `None` when a coalescing scheduler merged
    /// the request into the cycle that runs after the current one. Must be
    /// called from within a tokio runtime.
    pub fn trigger_async(
        &self,
        height: Height,
        metadata: BlockLiquidityMetadata,
    ) -> Option<JoinHandle<()>> {
        self.inner.counters.triggers.fetch_add(1, Ordering::Relaxed);

        match self.inner.config.mode {
            SchedulingMode::PerTrigger => {
                let inner = Arc::clone(&self.inner);
                Some(tokio::spawn(async move {
                    inner.run_isolated(PendingCycle::new(height, metadata)).await;
                }))
            }
            SchedulingMode::Coalescing => {
                let first = {
                    let mut state = self.inner.state.lock();
                    if state.in_flight {
                        state.enqueue(height, metadata);
                        self.inner.counters.coalesced.fetch_add(1, Ordering::Relaxed);
                        record_trigger_coalesced();
                        debug!(height, "Cycle in flight, merged trigger into pending work");
                        return None;
                    }
                    state.in_flight = true;

                    // Work left behind by a drain task that was cancelled
                    match state.pending.take() {
                        Some(mut leftover) => {
                            debug!(height = leftover.height, "Resuming abandoned pending work");
                            leftover.merge(height, metadata);
                            leftover
                        }
                        None => PendingCycle::new(height, metadata),
                    }
                };

                let guard = InFlightGuard {
                    inner: Arc::clone(&self.inner),
                    armed: true,
                };
                Some(tokio::spawn(Arc::clone(&self.inner).drain(guard, first)))
            }
        }
    }

    /// True while a coalescing cycle is running or pending
    pub fn is_processing(&self) -> bool {
        self.inner.state.lock().in_flight
    }

    pub fn stats(&self) -> SchedulerStats {
        let c = &self.inner.counters;
        SchedulerStats {
            triggers: c.triggers.load(Ordering::Relaxed),
            coalesced: c.coalesced.load(Ordering::Relaxed),
            cycles_completed: c.cycles_completed.load(Ordering::Relaxed),
            cycles_failed: c.cycles_failed.load(Ordering::Relaxed),
        }
    }
}

impl std::fmt::Debug for PricingScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PricingScheduler")
            .field("mode", &self.inner.config.mode)
            .field("quote_denom", &self.inner.quote_denom)
            .field("listeners", &self.inner.listeners.len())
            .field("stats", &self.stats())
            .finish()
    }
}

/// Clears the in-flight flag if a drain task ends without reaching idle,
/// including when it is cancelled before its first poll
struct InFlightGuard {
    inner: Arc<Inner>,
    armed: bool,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if self.armed {
            // Pending work stays queued for the next trigger
            self.inner.state.lock().in_flight = false;
            warn!("Pricing drain task cancelled, releasing the scheduler");
        }
    }
}

impl Inner {
    /// Runs cycles until no pending work is left, then clears the in-flight flag
    async fn drain(self: Arc<Self>, mut guard: InFlightGuard, first: PendingCycle) {
        let mut next = first;

        loop {
            self.run_isolated(next).await;

            let pending = {
                let mut state = self.state.lock();
                let pending = state.pending.take();
                if pending.is_none() {
                    state.in_flight = false;
                }
                pending
            };

            match pending {
                Some(pending) => {
                    debug!(height = pending.height, "Draining coalesced triggers");
                    next = pending;
                }
                None => {
                    guard.armed = false;
                    return;
                }
            }
        }
    }

    /// Runs one cycle on its own task so a panicking listener fails only that cycle
    async fn run_isolated(self: &Arc<Self>, cycle: PendingCycle) {
        let height = cycle.height;
        let inner = Arc::clone(self);
        let task = tokio::spawn(async move { inner.run_cycle(cycle.height, cycle.metadata).await });

        if let Err(e) = task.await {
            error!(height, error = %e, "Pricing cycle task panicked");
            self.fail_cycle("panic");
        }
    }

    async fn run_cycle(&self, height: Height, metadata: BlockLiquidityMetadata) {
        let start = Instant::now();
        let deadline = start + self.config.cycle_timeout();

        let base_denoms: Vec<Denom> = metadata.updated_tokens.iter().cloned().collect();
        let quote_denoms = [self.quote_denom.clone()];
        let options = PricingOptions::default()
            .with_recompute_prices()
            .with_min_pool_liquidity_cap(self.min_pool_liquidity_cap)
            .with_worker_precompute();

        let fetch = self.price_source.get_prices(&base_denoms, &quote_denoms, options);
        let prices = match timeout_at(deadline, fetch).await {
            Ok(Ok(prices)) => prices,
            Ok(Err(e)) => {
                error!(height, error = %e, "Price fetch failed, skipping cycle");
                self.fail_cycle("fetch");
                return;
            }
            Err(_) => {
                error!(
                    height,
                    timeout_ms = self.config.cycle_timeout_ms,
                    "Price fetch timed out, skipping repricing"
                );
                for listener in self.listeners.snapshot() {
                    listener.on_deadline_exceeded(height);
                }
                self.fail_cycle("timeout");
                return;
            }
        };

        let mut failed = false;
        for listener in self.listeners.snapshot() {
            if let Err(e) = listener
                .on_pricing_update(height, &metadata, &prices, &self.quote_denom, deadline)
                .await
            {
                warn!(height, error = %e, "Pricing update listener failed");
                failed = true;
            }
        }

        let elapsed = start.elapsed();
        record_cycle_duration(elapsed);

        if failed {
            self.fail_cycle("listener");
            return;
        }

        self.counters.cycles_completed.fetch_add(1, Ordering::Relaxed);
        info!(
            height,
            tokens = base_denoms.len(),
            priced = prices.len(),
            duration_ms = elapsed.as_millis() as u64,
            "Pricing cycle complete"
        );
    }

    fn fail_cycle(&self, stage: &'static str) {
        self.counters.cycles_failed.fetch_add(1, Ordering::Relaxed);
        record_cycle_error(stage);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use liqcap_core::{
        BigDec, CollaboratorError, CollaboratorResult, PoolLiquidityComputeListener, PricesResult,
        RepricingError, RepricingResult, U256,
    };
    use liqcap_pricing::Repricer;
    use liqcap_state::{PoolStore, ScalingFactorRegistry, StaticPriceSource, TokenValuationRegistry};
    use std::time::Duration;
    use tokio::sync::Semaphore;

    const QUOTE: &str = "usdc";

    fn pricing_config() -> PricingConfig {
        PricingConfig {
            default_quote_denom: QUOTE.to_string(),
            worker_min_pool_liquidity_cap: 1_000,
            ..PricingConfig::default()
        }
    }

    fn config(mode: SchedulingMode) -> SchedulerConfig {
        SchedulerConfig {
            mode,
            ..SchedulerConfig::default()
        }
    }

    #[derive(Default)]
    struct RecordingListener {
        heights: Mutex<Vec<Height>>,
        tokens: Mutex<Vec<Vec<Denom>>>,
        expired: Mutex<Vec<Height>>,
        fail: bool,
    }

    #[async_trait]
    impl PricingUpdateListener for RecordingListener {
        async fn on_pricing_update(
            &self,
            height: Height,
            metadata: &BlockLiquidityMetadata,
            _prices: &PricesResult,
            _quote_denom: &str,
            _deadline: Instant,
        ) -> RepricingResult<()> {
            self.heights.lock().push(height);
            self.tokens.lock().push(metadata.updated_tokens.iter().cloned().collect());
            if self.fail {
                return Err(RepricingError::DeadlineExceeded { height });
            }
            Ok(())
        }

        fn on_deadline_exceeded(&self, height: Height) {
            self.expired.lock().push(height);
        }
    }

    /// Panics on the first update only
    #[derive(Default)]
    struct PanickingListener {
        calls: AtomicU64,
    }

    #[async_trait]
    impl PricingUpdateListener for PanickingListener {
        async fn on_pricing_update(
            &self,
            height: Height,
            _metadata: &BlockLiquidityMetadata,
            _prices: &PricesResult,
            _quote_denom: &str,
            _deadline: Instant,
        ) -> RepricingResult<()> {
            if self.calls.fetch_add(1, Ordering::Relaxed) == 0 {
                panic!("listener bug at {height}");
            }
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingComputeListener {
        heights: Mutex<Vec<Height>>,
        delay: Option<Duration>,
        fail: bool,
    }

    impl PoolLiquidityComputeListener for RecordingComputeListener {
        fn on_pool_liquidity_compute(&self, height: Height) -> anyhow::Result<()> {
            if let Some(delay) = self.delay {
                std::thread::sleep(delay);
            }
            self.heights.lock().push(height);
            if self.fail {
                anyhow::bail!("downstream unavailable");
            }
            Ok(())
        }
    }

    /// Price source that blocks until the test releases permits
    struct GatedPriceSource {
        gate: Semaphore,
        requests: Mutex<Vec<Vec<Denom>>>,
    }

    impl GatedPriceSource {
        fn new() -> Self {
            Self {
                gate: Semaphore::new(0),
                requests: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl PriceSource for GatedPriceSource {
        async fn get_prices(
            &self,
            base_denoms: &[Denom],
            _quote_denoms: &[Denom],
            _options: PricingOptions,
        ) -> CollaboratorResult<PricesResult> {
            let _permit = self
                .gate
                .acquire()
                .await
                .map_err(|e| CollaboratorError::PriceSource(e.to_string()))?;
            self.requests.lock().push(base_denoms.to_vec());
            Ok(PricesResult::new())
        }
    }

    struct StalledPriceSource;

    #[async_trait]
    impl PriceSource for StalledPriceSource {
        async fn get_prices(
            &self,
            _base_denoms: &[Denom],
            _quote_denoms: &[Denom],
            _options: PricingOptions,
        ) -> CollaboratorResult<PricesResult> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(PricesResult::new())
        }
    }

    fn block(denom: &str, liquidity: u64) -> BlockLiquidityMetadata {
        BlockLiquidityMetadata::new().with_token(denom, U256::from(liquidity))
    }

    fn repricer(registry: Arc<TokenValuationRegistry>) -> Arc<Repricer> {
        Arc::new(Repricer::new(
            QUOTE,
            Arc::new(ScalingFactorRegistry::from_precisions([("uosmo", 6)]).unwrap()),
            Arc::new(PoolStore::new()),
            registry,
        ))
    }

    #[tokio::test]
    async fn test_every_listener_sees_height_once() {
        let source = Arc::new(StaticPriceSource::default());
        let scheduler = PricingScheduler::new(config(SchedulingMode::Coalescing), &pricing_config(), source.clone());
        let failing = Arc::new(RecordingListener { fail: true, ..Default::default() });
        let healthy = Arc::new(RecordingListener::default());
        scheduler.register_listener(failing.clone());
        scheduler.register_listener(healthy.clone());

        let handle = scheduler.trigger_async(42, block("uosmo", 1)).unwrap();
        handle.await.unwrap();

        assert_eq!(*failing.heights.lock(), vec![42]);
        assert_eq!(*healthy.heights.lock(), vec![42]);
        assert_eq!(source.fetch_count(), 1);
        assert_eq!(scheduler.stats().cycles_failed, 1);
        assert!(!scheduler.is_processing());
    }

    #[tokio::test]
    async fn test_fetch_uses_worker_options() {
        let source = Arc::new(StaticPriceSource::default());
        let scheduler = PricingScheduler::new(config(SchedulingMode::PerTrigger), &pricing_config(), source.clone());

        scheduler.trigger_async(1, block("uosmo", 1)).unwrap().await.unwrap();

        let options = source.last_options().unwrap();
        assert!(options.recompute_prices);
        assert!(options.is_worker_precompute);
        assert_eq!(options.min_pool_liquidity_cap, 1_000);
        assert_eq!(scheduler.stats().cycles_completed, 1);
    }

    #[tokio::test]
    async fn test_triggers_during_cycle_are_coalesced() {
        let source = Arc::new(GatedPriceSource::new());
        let scheduler = PricingScheduler::new(config(SchedulingMode::Coalescing), &pricing_config(), source.clone());
        let listener = Arc::new(RecordingListener::default());
        scheduler.register_listener(listener.clone());

        let first = scheduler.trigger_async(1, block("uosmo", 1)).unwrap();
        assert!(scheduler.is_processing());
        assert!(scheduler.trigger_async(3, block("atom", 3)).is_none());
        assert!(scheduler.trigger_async(2, block("weth", 2)).is_none());

        source.gate.add_permits(2);
        first.await.unwrap();

        assert_eq!(*listener.heights.lock(), vec![1, 3]);
        assert_eq!(
            *listener.tokens.lock(),
            vec![vec!["uosmo".to_string()], vec!["atom".to_string(), "weth".to_string()]]
        );
        assert_eq!(source.requests.lock().len(), 2);

        let stats = scheduler.stats();
        assert_eq!(stats.triggers, 3);
        assert_eq!(stats.coalesced, 2);
        assert_eq!(stats.cycles_completed, 2);
        assert!(!scheduler.is_processing());
    }

    #[tokio::test]
    async fn test_per_trigger_mode_runs_every_trigger() {
        let source = Arc::new(StaticPriceSource::default());
        let scheduler = PricingScheduler::new(config(SchedulingMode::PerTrigger), &pricing_config(), source.clone());
        let listener = Arc::new(RecordingListener::default());
        scheduler.register_listener(listener.clone());

        let a = scheduler.trigger_async(5, block("uosmo", 1)).unwrap();
        let b = scheduler.trigger_async(6, block("uosmo", 2)).unwrap();
        a.await.unwrap();
        b.await.unwrap();

        let mut heights = listener.heights.lock().clone();
        heights.sort_unstable();
        assert_eq!(heights, vec![5, 6]);
        assert_eq!(source.fetch_count(), 2);
        assert_eq!(scheduler.stats().coalesced, 0);
    }

    #[tokio::test]
    async fn test_failed_fetch_skips_listeners() {
        let source = Arc::new(StaticPriceSource::default());
        source.set_failure(Some("oracle down".to_string()));
        let scheduler = PricingScheduler::new(config(SchedulingMode::Coalescing), &pricing_config(), source);
        let listener = Arc::new(RecordingListener::default());
        scheduler.register_listener(listener.clone());

        scheduler.trigger_async(7, block("uosmo", 1)).unwrap().await.unwrap();

        assert!(listener.heights.lock().is_empty());
        assert!(listener.expired.lock().is_empty());
        assert_eq!(scheduler.stats().cycles_failed, 1);
        assert!(!scheduler.is_processing());
    }

    #[tokio::test]
    async fn test_fetch_timeout_notifies_without_repricing() {
        let scheduler = PricingScheduler::new(
            SchedulerConfig {
                mode: SchedulingMode::Coalescing,
                cycle_timeout_ms: 20,
            },
            &pricing_config(),
            Arc::new(StalledPriceSource),
        );
        let listener = Arc::new(RecordingListener::default());
        scheduler.register_listener(listener.clone());

        scheduler.trigger_async(8, block("uosmo", 1)).unwrap().await.unwrap();

        assert!(listener.heights.lock().is_empty());
        assert_eq!(*listener.expired.lock(), vec![8]);
        assert_eq!(scheduler.stats().cycles_failed, 1);
    }

    #[tokio::test]
    async fn test_fetch_timeout_still_reaches_compute_listeners() {
        let registry = Arc::new(TokenValuationRegistry::new());
        let repricer = repricer(registry.clone());
        let compute = Arc::new(RecordingComputeListener::default());
        repricer.register_listener(compute.clone());

        let scheduler = PricingScheduler::new(
            SchedulerConfig {
                mode: SchedulingMode::Coalescing,
                cycle_timeout_ms: 20,
            },
            &pricing_config(),
            Arc::new(StalledPriceSource),
        );
        scheduler.register_listener(repricer.clone());

        scheduler.trigger_async(9, block("uosmo", 1_000_000)).unwrap().await.unwrap();
        repricer.wait_for_listeners().await;

        assert_eq!(*compute.heights.lock(), vec![9]);
        assert!(registry.get("uosmo").is_none());
        assert_eq!(repricer.height_for_denom("uosmo"), None);
        assert_eq!(scheduler.stats().cycles_failed, 1);
    }

    #[tokio::test]
    async fn test_panicking_listener_does_not_wedge_scheduler() {
        let source = Arc::new(StaticPriceSource::default());
        let scheduler = PricingScheduler::new(config(SchedulingMode::Coalescing), &pricing_config(), source.clone());
        let healthy = Arc::new(RecordingListener::default());
        scheduler.register_listener(healthy.clone());
        scheduler.register_listener(Arc::new(PanickingListener::default()));

        scheduler.trigger_async(1, block("uosmo", 1)).unwrap().await.unwrap();

        assert!(!scheduler.is_processing());
        assert_eq!(scheduler.stats().cycles_failed, 1);

        let second = scheduler.trigger_async(2, block("uosmo", 1));
        second.expect("scheduler accepts work after a panic").await.unwrap();

        assert_eq!(*healthy.heights.lock(), vec![1, 2]);
        let stats = scheduler.stats();
        assert_eq!(stats.cycles_failed, 1);
        assert_eq!(stats.cycles_completed, 1);
        assert!(!scheduler.is_processing());
    }

    #[tokio::test]
    async fn test_cancelled_drain_hands_pending_work_to_next_trigger() {
        let source = Arc::new(GatedPriceSource::new());
        let scheduler = PricingScheduler::new(config(SchedulingMode::Coalescing), &pricing_config(), source.clone());
        let listener = Arc::new(RecordingListener::default());
        scheduler.register_listener(listener.clone());

        let first = scheduler.trigger_async(1, block("uosmo", 1)).unwrap();
        assert!(scheduler.trigger_async(2, block("atom", 2)).is_none());

        // Let the drain task reach the gated fetch
        tokio::task::yield_now().await;
        first.abort();
        assert!(first.await.unwrap_err().is_cancelled());
        assert!(!scheduler.is_processing());

        let resumed = scheduler.trigger_async(3, block("weth", 3)).unwrap();
        // One permit for the orphaned fetch of height 1, one for the resumed cycle
        source.gate.add_permits(2);
        resumed.await.unwrap();

        assert!(listener
            .tokens
            .lock()
            .contains(&vec!["atom".to_string(), "weth".to_string()]));
        assert!(!scheduler.is_processing());
    }

    #[tokio::test]
    async fn test_slow_compute_listener_does_not_delay_next_cycle() {
        let source = Arc::new(StaticPriceSource::new(
            PricesResult::new().with_price("uosmo", QUOTE, BigDec::from_int(2)),
        ));
        let repricer = repricer(Arc::new(TokenValuationRegistry::new()));
        let slow = Arc::new(RecordingComputeListener {
            delay: Some(Duration::from_millis(500)),
            ..Default::default()
        });
        repricer.register_listener(slow.clone());

        let scheduler = PricingScheduler::new(config(SchedulingMode::Coalescing), &pricing_config(), source);
        scheduler.register_listener(repricer.clone());

        let first = scheduler.trigger_async(1, block("uosmo", 1_000_000)).unwrap();
        assert!(scheduler.trigger_async(2, block("uosmo", 2_000_000)).is_none());

        tokio::time::timeout(Duration::from_millis(250), first)
            .await
            .expect("both cycles finish while the listener sleeps")
            .unwrap();
        assert_eq!(scheduler.stats().cycles_completed, 2);

        repricer.wait_for_listeners().await;
        assert_eq!(*slow.heights.lock(), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_end_to_end_with_repricer() {
        let source = Arc::new(StaticPriceSource::new(
            PricesResult::new().with_price("uosmo", QUOTE, BigDec::from_int(2)),
        ));
        let registry = Arc::new(TokenValuationRegistry::new());
        let repricer = repricer(registry.clone());
        let failing = Arc::new(RecordingComputeListener { fail: true, ..Default::default() });
        let healthy = Arc::new(RecordingComputeListener::default());
        repricer.register_listener(failing.clone());
        repricer.register_listener(healthy.clone());

        let scheduler = PricingScheduler::new(config(SchedulingMode::Coalescing), &pricing_config(), source);
        scheduler.register_listener(repricer.clone());

        scheduler
            .trigger_async(100, block("uosmo", 1_000_000))
            .unwrap()
            .await
            .unwrap();
        repricer.wait_for_listeners().await;

        assert_eq!(*failing.heights.lock(), vec![100]);
        assert_eq!(*healthy.heights.lock(), vec![100]);
        assert_eq!(registry.get("uosmo").unwrap().total_liquidity_cap, U256::from(2u64));
        assert_eq!(scheduler.stats().cycles_completed, 1);
    }
}
