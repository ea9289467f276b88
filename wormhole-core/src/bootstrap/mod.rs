//! Bootstrap module for initializing the Wormhole server
//!
//! This module handles:
//! - Configuration loading
//! - Hub initialization

pub mod config;
pub mod hub;

pub use config::load_config;
pub use hub::init_hub;
