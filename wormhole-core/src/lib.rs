pub mod bootstrap;
pub mod clock;
pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod sync;

pub use config::Config;
pub use error::{Error, Result};
pub use models::value::{SharedValue, ValueState};
pub use sync::{Subscription, SyncHub};
