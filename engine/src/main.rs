// Docia document question answering
// Main entry point for the docia binary

use clap::Parser;
use docia_engine::cli::{Cli, Command};
use docia_engine::config::Config;
use docia_engine::handlers::{handle_ask, handle_chat, handle_docs, OutputFormat};
use docia_engine::telemetry::init_telemetry_with_level;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Load configuration (or use custom path if provided)
    let config = if let Some(config_path) = &cli.config {
        Config::load_from_path(config_path)?
    } else {
        Config::load_or_create()?
    };

    // The subscriber is installed once: --log wins over the configured level
    init_telemetry_with_level(cli.log.as_deref().unwrap_or(&config.core.log_level));

    let version = env!("CARGO_PKG_VERSION");
    let commit = env!("GIT_COMMIT_HASH");
    let timestamp = env!("BUILD_TIMESTAMP");

    tracing::debug!("Docia Engine v{} ({} - {})", version, commit, timestamp);

    // Determine output format
    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Text
    };

    // Handle commands
    match cli.command {
        Command::Ask { question, args } => handle_ask(question, args, &config, format).await,
        Command::Chat { args } => handle_chat(args, &config, format).await,
        Command::Docs { docs } => handle_docs(docs, &config, format).await,
    }
}
