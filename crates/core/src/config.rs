//! Configuration types

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::{Dec, DecimalResult, Denom};

/// Pricing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PricingConfig {
    /// Chain denom every capitalization is expressed in
    pub default_quote_denom: Denom,
    /// Minimum liquidity capitalization a pool needs to be used by the pricing worker
    pub worker_min_pool_liquidity_cap: u64,
    /// Decimal precision per chain denom, turned into `10^precision` scaling factors
    pub token_precisions: HashMap<Denom, u32>,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            default_quote_denom: "usdc".to_string(),
            worker_min_pool_liquidity_cap: 0,
            token_precisions: HashMap::new(),
        }
    }
}

impl PricingConfig {
    /// Rejects token precisions whose scaling factor cannot be represented
    pub fn validate(&self) -> DecimalResult<()> {
        for precision in self.token_precisions.values() {
            Dec::from_precision(*precision)?;
        }
        Ok(())
    }
}

/// How triggers that arrive while a cycle is running are handled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulingMode {
    /// One cycle in flight; later triggers merge into a pending set drained on completion
    Coalescing,
    /// Every trigger gets its own task, no concurrency cap
    PerTrigger,
}

/// Pricing scheduler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub mode: SchedulingMode,
    /// Upper bound on fetch + reprice + persist for one cycle
    pub cycle_timeout_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            mode: SchedulingMode::Coalescing,
            cycle_timeout_ms: 120_000,  // 2 minutes
        }
    }
}

impl SchedulerConfig {
    pub fn cycle_timeout(&self) -> Duration {
        Duration::from_millis(self.cycle_timeout_ms)
    }
}
