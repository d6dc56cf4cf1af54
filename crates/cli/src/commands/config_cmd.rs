//! `tollgate config` — print the effective configuration.

use std::path::Path;

pub fn show(config_path: Option<&Path>) -> anyhow::Result<()> {
    let config = super::load_config(config_path)?;

    println!("# Effective configuration (secrets redacted)");
    println!("{}", config.redacted().to_toml_string()?);

    if config.remote_providers.is_empty() {
        println!("# No remote providers: requests go to local servers only.");
    }
    if !config.local_fallback_enabled() {
        println!("# Local fallback is disabled.");
    }
    Ok(())
}
