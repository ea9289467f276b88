//! Time source for the synchronization hub
//!
//! Monotonic readings come from `tokio::time::Instant` so that expiry
//! deadlines and recorded write times follow the runtime clock, including
//! the paused clock used by tests.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::time::Instant;

/// Source of monotonic and wall-clock time
pub trait Clock: Send + Sync + std::fmt::Debug {
    /// Monotonic instant used for TTL scheduling
    fn now(&self) -> Instant;

    /// Wall-clock time, only used for reporting
    fn utc_now(&self) -> DateTime<Utc>;
}

/// Clock backed by the tokio runtime and the system wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

impl Clock for TokioClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn utc_now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

pub type SharedClock = Arc<dyn Clock>;

#[must_use]
pub fn default_clock() -> SharedClock {
    Arc::new(TokioClock)
}
