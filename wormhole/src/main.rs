mod server;

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing::info;

use wormhole_core::{
    bootstrap::{init_hub, load_config},
    logging,
};

use server::WormholeServer;

#[derive(Parser, Debug)]
#[command(name = "wormhole")]
#[command(about = "Shared ephemeral value relay", long_about = None)]
struct Args {
    /// Path to a YAML config file
    #[arg(long, short, env = "WORMHOLE_CONFIG_PATH")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // 1. Load configuration (validated, fails fast)
    let config = load_config(args.config.as_deref())?;

    // 2. Initialize logging
    logging::init_logging(&config.logging)?;
    info!("Wormhole server starting...");
    info!("HTTP address: {}", config.http_address());
    info!(
        ttl_ms = config.sync.ttl_ms,
        subscriber_buffer = config.sync.subscriber_buffer,
        "Sync settings"
    );

    // 3. Initialize the sync hub
    let hub = init_hub(&config);
    info!("SyncHub initialized");

    // 4. Serve until a shutdown signal arrives
    WormholeServer::new(config, hub).start().await
}
