//! Mentora CLI — the main entry point.
//!
//! Commands:
//! - `run`             — Run a scripted demo lesson end to end
//! - `validate-config` — Check a configuration file

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(
    name = "mentora",
    about = "Mentora — AI lesson orchestration runtime",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a scripted demo lesson against the in-memory stack
    Run {
        /// Optional config file (defaults to mentora.toml / MENTORA_CONFIG)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Validate a configuration file
    ValidateConfig {
        /// Path to the config file
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
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

    match cli.command {
        Commands::Run { config } => commands::run::run(config).await?,
        Commands::ValidateConfig { path } => commands::validate_config::run(&path)?,
    }
    Ok(())
}
