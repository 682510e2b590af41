//! Pricing scheduler
//!
//! Turns "a block with these updated tokens arrived" into a background
//! fetch-and-reprice cycle, so block ingestion never waits on the price source.

pub mod metrics;
pub mod pending;
pub mod scheduler;

pub use pending::PendingCycle;
pub use scheduler::{PricingScheduler, SchedulerStats};
