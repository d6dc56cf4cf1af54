//! `tollgate complete` / `tollgate stream` — send one prompt.

use anyhow::Context;
use futures::StreamExt;
use std::io::Write;
use std::path::Path;

use tollgate_gateway::RequestOrchestrator;

use crate::PromptArgs;

pub async fn run(config_path: Option<&Path>, args: &PromptArgs) -> anyhow::Result<()> {
    let orchestrator = RequestOrchestrator::new(super::load_config(config_path)?)?;

    let result = orchestrator
        .complete_detailed(&args.prompt, &args.options())
        .await?;

    println!("{}", result.text);
    eprintln!();
    eprintln!(
        "   {} · {} tokens · ${:.6}{}",
        result.backend_name,
        result.token_count,
        result.cost,
        if result.was_cached { " (cached)" } else { "" }
    );
    Ok(())
}

pub async fn stream(config_path: Option<&Path>, args: &PromptArgs) -> anyhow::Result<()> {
    let orchestrator = RequestOrchestrator::new(super::load_config(config_path)?)?;

    let mut stream = orchestrator.stream(&args.prompt, &args.options()).await?;
    let backend = stream.backend_name().to_string();
    let mut stdout = std::io::stdout();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        stdout.write_all(chunk.as_bytes()).context("Failed to write to stdout")?;
        stdout.flush().ok();
    }
    println!();

    let status = orchestrator.budget_status();
    eprintln!("   {backend} · ${:.6} spent today", status.used);
    Ok(())
}
