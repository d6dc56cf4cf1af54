pub mod budget;
pub mod complete;
pub mod compress;
pub mod config_cmd;
pub mod serve;

use anyhow::Context;
use std::path::Path;
use tollgate_config::GatewayConfig;

/// Load the config from `path` (or the default location) with env overrides.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<GatewayConfig> {
    match path {
        Some(path) => GatewayConfig::load_with_env(path)
            .with_context(|| format!("Failed to load config from {}", path.display())),
        None => GatewayConfig::load().context("Failed to load config"),
    }
}
