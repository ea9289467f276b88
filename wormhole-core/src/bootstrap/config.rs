//! Configuration loading

use anyhow::Result;
use std::path::Path;
use tracing::info;

use crate::Config;

const CWD_CONFIG: &str = "wormhole.yaml";
const MOUNTED_CONFIG: &str = "/config/wormhole.yaml";

/// Load configuration from a config file and environment variables
///
/// Config file search order:
/// 1. `explicit` path (CLI flag or WORMHOLE_CONFIG_PATH)
/// 2. ./wormhole.yaml (current working directory)
/// 3. /config/wormhole.yaml (Kubernetes mount path)
/// 4. Fall back to environment variables only
pub fn load_config(explicit: Option<&Path>) -> Result<Config> {
    let config_path = resolve_config_path(explicit);

    let config = if let Some(path) = config_path {
        eprintln!("Loading config from {path}");
        match Config::from_file(&path) {
            Ok(cfg) => cfg,
            Err(e) => {
                eprintln!("Failed to load {path}: {e}");
                eprintln!("Falling back to environment variables");
                Config::from_env().unwrap_or_default()
            }
        }
    } else {
        eprintln!("No config file found, using environment variables");
        Config::from_env().unwrap_or_else(|e| {
            eprintln!("Failed to load config: {e}");
            eprintln!("Using default configuration");
            Config::default()
        })
    };

    // Fail fast on misconfigurations
    if let Err(errors) = config.validate() {
        return Err(anyhow::anyhow!(
            "Configuration validation failed with {} error(s): {}",
            errors.len(),
            errors.join("; ")
        ));
    }

    info!("Configuration loaded and validated successfully");
    Ok(config)
}

fn resolve_config_path(explicit: Option<&Path>) -> Option<String> {
    explicit
        .filter(|p| p.exists())
        .map(|p| p.to_string_lossy().into_owned())
        .or_else(|| Path::new(CWD_CONFIG).exists().then(|| CWD_CONFIG.to_string()))
        .or_else(|| {
            Path::new(MOUNTED_CONFIG)
                .exists()
                .then(|| MOUNTED_CONFIG.to_string())
        })
}
