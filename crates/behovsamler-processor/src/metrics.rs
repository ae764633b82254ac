//! Prometheus metrics for the accumulator.
//!
//! Counters are registered once into a dedicated registry; an exporter
//! scrapes `REGISTRY` through whatever observability surface the
//! deployment provides.

use lazy_static::lazy_static;
use prometheus::{IntCounter, IntCounterVec, Opts, Registry};
use std::sync::Once;

static INIT: Once = Once::new();

lazy_static! {
    /// Global Prometheus metrics registry.
    pub static ref REGISTRY: Registry = Registry::new();

    /// Records read from the topic, labelled by processing outcome.
    pub static ref RECORDS_PROCESSED_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new(
            "behovsamler_records_processed_total",
            "Records read from the topic by outcome"
        ),
        &["outcome"]
    ).expect("metric can be created");

    /// Records dropped because they were not a JSON object with a string @id.
    pub static ref MALFORMED_RECORDS_TOTAL: IntCounter = IntCounter::new(
        "behovsamler_malformed_records_total",
        "Records dropped as malformed"
    ).expect("metric can be created");

    /// Final records emitted onto the topic.
    pub static ref FINALS_EMITTED_TOTAL: IntCounter = IntCounter::new(
        "behovsamler_finals_emitted_total",
        "Final records emitted"
    ).expect("metric can be created");

    /// Partition rebalance events, labelled assigned / revoked.
    pub static ref REBALANCES_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new(
            "behovsamler_rebalances_total",
            "Partition rebalance events"
        ),
        &["event"]
    ).expect("metric can be created");

    /// State sections rebuilt from their changelog.
    pub static ref STATE_RESTORES_TOTAL: IntCounter = IntCounter::new(
        "behovsamler_state_restores_total",
        "State sections restored from changelog"
    ).expect("metric can be created");
}

/// Register all metrics with [`REGISTRY`]. Safe to call more than once.
pub fn register_metrics() {
    INIT.call_once(|| {
        REGISTRY
            .register(Box::new(RECORDS_PROCESSED_TOTAL.clone()))
            .expect("collector can be registered");
        REGISTRY
            .register(Box::new(MALFORMED_RECORDS_TOTAL.clone()))
            .expect("collector can be registered");
        REGISTRY
            .register(Box::new(FINALS_EMITTED_TOTAL.clone()))
            .expect("collector can be registered");
        REGISTRY
            .register(Box::new(REBALANCES_TOTAL.clone()))
            .expect("collector can be registered");
        REGISTRY
            .register(Box::new(STATE_RESTORES_TOTAL.clone()))
            .expect("collector can be registered");
    });
}
