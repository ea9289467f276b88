//! Prometheus metrics for the synchronization hub
//!
//! Exposed via the /metrics endpoint for Prometheus scraping.

use prometheus::{
    register_int_counter_vec_with_registry, register_int_counter_with_registry,
    register_int_gauge_with_registry, Encoder, IntCounter, IntCounterVec, IntGauge, Registry,
    TextEncoder,
};
use std::sync::LazyLock;

use crate::models::SharedValue;
use crate::sync::ValueObserver;

/// Global metrics registry
pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

/// Accepted client writes, including clears to empty
pub static WRITES_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    register_int_counter_with_registry!(
        "wormhole_writes_total",
        "Total number of accepted client writes",
        REGISTRY.clone()
    )
    .expect("Failed to register WRITES_TOTAL")
});

/// Expiry timer fires, labelled `applied` or `stale`
pub static EXPIRIES_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec_with_registry!(
        "wormhole_expiries_total",
        "Total number of expiry timer fires",
        &["outcome"],
        REGISTRY.clone()
    )
    .expect("Failed to register EXPIRIES_TOTAL")
});

/// Per-subscriber deliveries, labelled `delivered`, `closed` or `full`
pub static DELIVERIES_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec_with_registry!(
        "wormhole_deliveries_total",
        "Total number of per-subscriber deliveries",
        &["outcome"],
        REGISTRY.clone()
    )
    .expect("Failed to register DELIVERIES_TOTAL")
});

/// Currently registered subscribers
pub static SUBSCRIBERS: LazyLock<IntGauge> = LazyLock::new(|| {
    register_int_gauge_with_registry!(
        "wormhole_subscribers",
        "Current number of registered subscribers",
        REGISTRY.clone()
    )
    .expect("Failed to register SUBSCRIBERS")
});

pub static VALUE_VERSION: LazyLock<IntGauge> = LazyLock::new(|| {
    register_int_gauge_with_registry!(
        "wormhole_value_version",
        "Version of the current shared value",
        REGISTRY.clone()
    )
    .expect("Failed to register VALUE_VERSION")
});

/// 1 while the shared value holds content, 0 when empty
pub static VALUE_SET: LazyLock<IntGauge> = LazyLock::new(|| {
    register_int_gauge_with_registry!(
        "wormhole_value_set",
        "Whether the shared value currently holds content",
        REGISTRY.clone()
    )
    .expect("Failed to register VALUE_SET")
});

/// Observer that mirrors every transition into the value gauges
#[derive(Debug, Clone)]
pub struct MetricsObserver {
    version: IntGauge,
    set: IntGauge,
}

impl MetricsObserver {
    /// Observer bound to the global `VALUE_VERSION` and `VALUE_SET` gauges
    #[must_use]
    pub fn new() -> Self {
        Self::with_gauges(VALUE_VERSION.clone(), VALUE_SET.clone())
    }

    #[must_use]
    pub const fn with_gauges(version: IntGauge, set: IntGauge) -> Self {
        Self { version, set }
    }
}

impl Default for MetricsObserver {
    fn default() -> Self {
        Self::new()
    }
}

impl ValueObserver for MetricsObserver {
    fn on_value_changed(&self, value: &SharedValue) {
        self.version.set(i64::try_from(value.version).unwrap_or(i64::MAX));
        self.set.set(i64::from(!value.is_empty()));
    }
}

/// Expose metrics in Prometheus format
pub fn gather_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|_| prometheus::Error::Msg("Invalid UTF-8".to_string()))
}
