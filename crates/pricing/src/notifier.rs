//! Pool liquidity notifications
//!
//! Compute listeners are synchronous and may block, so each notification is
//! delivered on tokio's blocking pool instead of the pricing task. Deliveries
//! are chained: a listener sees heights in the order they were committed.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, warn};

use liqcap_core::{Height, PoolLiquidityComputeListener};

use crate::ListenerRegistry;

pub struct ComputeNotifier {
    listeners: ListenerRegistry<dyn PoolLiquidityComputeListener>,
    /// Last queued delivery; the next one waits for it
    tail: Mutex<Option<JoinHandle<()>>>,
    queued: AtomicU64,
    delivered: Arc<watch::Sender<u64>>,
}

impl ComputeNotifier {
    pub fn new() -> Self {
        let (delivered, _) = watch::channel(0);
        Self {
            listeners: ListenerRegistry::new(),
            tail: Mutex::new(None),
            queued: AtomicU64::new(0),
            delivered: Arc::new(delivered),
        }
    }

    pub fn register(&self, listener: Arc<dyn PoolLiquidityComputeListener>) {
        self.listeners.register(listener);
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    /// Queues `height` for every registered listener and returns immediately.
    ///
    /// Outside a tokio runtime the listeners are called inline.
    pub fn notify(&self, height: Height) {
        let listeners = self.listeners.snapshot();
        if listeners.is_empty() {
            return;
        }

        let Ok(runtime) = Handle::try_current() else {
            deliver(height, &listeners);
            return;
        };

        let mut tail = self.tail.lock();
        let seq = self.queued.fetch_add(1, Ordering::Relaxed) + 1;
        let previous = tail.take();
        let delivered = Arc::clone(&self.delivered);

        *tail = Some(runtime.spawn(async move {
            if let Some(previous) = previous {
                // Failures of the previous delivery were logged by its own task
                let _ = previous.await;
            }

            let outcome = tokio::task::spawn_blocking(move || deliver(height, &listeners)).await;
            if let Err(e) = outcome {
                error!(height, error = %e, "Pool liquidity listener panicked");
            }

            delivered.send_replace(seq);
        }));
    }

    /// Resolves once every notification queued before the call was delivered
    pub async fn wait_idle(&self) {
        let target = self.queued.load(Ordering::Relaxed);
        let mut delivered = self.delivered.subscribe();
        // The sender lives in `self`, so the channel cannot close here
        let _ = delivered.wait_for(|seq| *seq >= target).await;
    }
}

impl Default for ComputeNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ComputeNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComputeNotifier")
            .field("listeners", &self.listeners.len())
            .field("queued", &self.queued.load(Ordering::Relaxed))
            .field("delivered", &*self.delivered.borrow())
            .finish()
    }
}

fn deliver(height: Height, listeners: &[Arc<dyn PoolLiquidityComputeListener>]) {
    for listener in listeners {
        if let Err(e) = listener.on_pool_liquidity_compute(height) {
            warn!(height, error = %e, "Pool liquidity listener failed");
        }
    }
}
