//! Pricing pipeline metrics
//!
//! Recorded through the `metrics` facade. Nothing is exported unless the
//! embedding process installs a recorder.

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use std::time::Duration;

pub const PRICING_CYCLE_DURATION_MS: &str = "liqcap_pricing_cycle_duration_ms";
pub const PRICING_CYCLE_ERRORS_TOTAL: &str = "liqcap_pricing_cycle_errors_total";
pub const PRICING_TRIGGERS_COALESCED_TOTAL: &str = "liqcap_pricing_triggers_coalesced_total";
pub const REPRICING_DURATION_MS: &str = "liqcap_repricing_duration_ms";

/// Registers descriptions for every pipeline metric. Call once at startup.
pub fn describe_metrics() {
    describe_histogram!(
        PRICING_CYCLE_DURATION_MS,
        Unit::Milliseconds,
        "Duration of a pricing cycle: price fetch plus every listener"
    );
    describe_counter!(
        PRICING_CYCLE_ERRORS_TOTAL,
        "Pricing cycles that failed, labelled by stage"
    );
    describe_counter!(
        PRICING_TRIGGERS_COALESCED_TOTAL,
        "Triggers merged into a pending cycle instead of starting a new one"
    );
    describe_histogram!(
        REPRICING_DURATION_MS,
        Unit::Milliseconds,
        "Duration of token and pool repricing for one height"
    );
}

pub fn record_cycle_duration(elapsed: Duration) {
    histogram!(PRICING_CYCLE_DURATION_MS).record(elapsed.as_secs_f64() * 1000.0);
}

/// `stage` is one of `fetch`, `timeout`, `listener`, `panic`
pub fn record_cycle_error(stage: &'static str) {
    counter!(PRICING_CYCLE_ERRORS_TOTAL, "stage" => stage).increment(1);
}

pub fn record_trigger_coalesced() {
    counter!(PRICING_TRIGGERS_COALESCED_TOTAL).increment(1);
}
