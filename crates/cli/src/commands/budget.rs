//! `tollgate budget` and `tollgate pricing`.

use std::path::Path;

use tollgate_gateway::RequestOrchestrator;
use tollgate_telemetry::PricingTable;

/// Show today's spend against the daily limit.
pub fn run(config_path: Option<&Path>) -> anyhow::Result<()> {
    let config = super::load_config(config_path)?;
    let orchestrator = RequestOrchestrator::new(config)?;
    let status = orchestrator.budget_status();

    println!("💸 Daily Budget");
    println!("─────────────────────────────────────");
    if status.is_unlimited() {
        println!("  Limit:     unlimited");
        println!("  Used:      ${:.6}", status.used);
    } else {
        println!("  Limit:     ${:.2}", status.daily_limit);
        println!("  Used:      ${:.6} ({:.1}%)", status.used, status.percentage());
        println!("  Remaining: ${:.6}", status.remaining);
    }
    println!("  Resets at: {}", status.reset_at.format("%Y-%m-%d %H:%M UTC"));

    println!();
    println!("  Backends (in failover order):");
    for backend in orchestrator.registry().iter() {
        println!("    {:<12} {}", backend.name(), backend.kind());
    }

    Ok(())
}

/// List available model pricing.
pub fn pricing() {
    let table = PricingTable::with_defaults();
    let models = table.models();

    println!("💰 Model Pricing (per 1M tokens)");
    println!("─────────────────────────────────────────────────────");
    println!("{:<48} {:>10} {:>10}", "Model", "Input", "Output");

    for name in &models {
        if let Some(p) = table.get(name) {
            println!(
                "{:<48} ${:>8.3} ${:>8.3}",
                name, p.input_per_m, p.output_per_m
            );
        }
    }

    println!();
    println!("  {} models with pricing data", models.len());
}
