//! Hub initialization

use std::sync::Arc;
use tracing::info;

use crate::metrics::MetricsObserver;
use crate::sync::{HubConfig, SyncHub};
use crate::Config;

/// Build the synchronization hub with the metrics observer attached
#[must_use]
pub fn init_hub(config: &Config) -> SyncHub {
    let hub = SyncHub::new(HubConfig::from(&config.sync));
    hub.add_observer(Arc::new(MetricsObserver::new()));
    info!(ttl_ms = config.sync.ttl_ms, "Synchronization hub ready");
    hub
}
