//! `tollgate serve` — start the HTTP API.

use anyhow::Context;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use tollgate_gateway::{RequestOrchestrator, api};

pub async fn run(config_path: Option<&Path>, port_override: Option<u16>) -> anyhow::Result<()> {
    let mut config = super::load_config(config_path)?;
    if let Some(port) = port_override {
        config.server.port = port;
    }

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .with_context(|| format!("Invalid listen address {}", config.server.host))?;

    let orchestrator = Arc::new(RequestOrchestrator::new(config)?);

    println!("🚦 Tollgate");
    println!("   Listening: http://{addr}");
    println!("   Backends:  {}", orchestrator.registry().names().join(", "));
    let status = orchestrator.budget_status();
    if status.is_unlimited() {
        println!("   Budget:    unlimited");
    } else {
        println!("   Budget:    ${:.2}/day", status.daily_limit);
    }

    api::serve(orchestrator, addr).await?;
    Ok(())
}
