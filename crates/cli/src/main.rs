//! Tollgate CLI — the main entry point.
//!
//! Commands:
//! - `complete` — Send one prompt through the gateway
//! - `stream`   — Same, printing chunks as they arrive
//! - `budget`   — Show today's spend against the daily limit
//! - `compress` — Preview prompt compression
//! - `config`   — Print the effective (redacted) configuration
//! - `pricing`  — List built-in model prices
//! - `serve`    — Start the HTTP API

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use tollgate_config::CompressionLevel;
use tollgate_core::{BackendKind, CompletionOptions};

mod commands;

#[derive(Parser)]
#[command(
    name = "tollgate",
    about = "Tollgate — budget-capped, cached, failover gateway for LLM completions",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (defaults to ~/.tollgate/config.toml)
    #[arg(short, long, global = true, env = "TOLLGATE_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Complete a prompt
    Complete(PromptArgs),

    /// Stream a completion to stdout
    Stream(PromptArgs),

    /// Show budget status
    Budget,

    /// Show what compression does to a text
    Compress {
        text: String,

        /// Compression level (defaults to the configured one)
        #[arg(short, long)]
        level: Option<CompressionLevel>,
    },

    /// Print the effective configuration with secrets redacted
    Config,

    /// List built-in model pricing
    Pricing,

    /// Start the HTTP API
    Serve {
        /// Override the port
        #[arg(short, long)]
        port: Option<u16>,
    },
}

#[derive(Args, Debug, Clone)]
pub struct PromptArgs {
    prompt: String,

    /// Model to request
    #[arg(short, long)]
    model: Option<String>,

    /// Sampling temperature
    #[arg(short, long)]
    temperature: Option<f32>,

    /// Maximum tokens to generate
    #[arg(long)]
    max_tokens: Option<u32>,

    /// Only use remote or local backends
    #[arg(long, value_name = "remote|local")]
    force: Option<BackendKind>,
}

impl PromptArgs {
    pub fn options(&self) -> CompletionOptions {
        CompletionOptions {
            model: self.model.clone(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            force_backend: self.force,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    let config_path = cli.config.as_deref();
    match cli.command {
        Commands::Complete(args) => commands::complete::run(config_path, &args).await?,
        Commands::Stream(args) => commands::complete::stream(config_path, &args).await?,
        Commands::Budget => commands::budget::run(config_path)?,
        Commands::Compress { text, level } => commands::compress::run(config_path, &text, level)?,
        Commands::Config => commands::config_cmd::show(config_path)?,
        Commands::Pricing => commands::budget::pricing(),
        Commands::Serve { port } => commands::serve::run(config_path, port).await?,
    }

    Ok(())
}
