//! MedAssist CLI
//!
//! Ingest health content and talk to the assistant from a terminal.

use anyhow::Result;
use clap::Parser;
use medassist_core::error::exit_codes;
use medassist_core::{Config, MedAssistError};

mod app;
mod commands;
mod output;

use app::{Cli, Commands};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()),
        )
        .init();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {:#}", e);
        let code = e
            .downcast_ref::<MedAssistError>()
            .map(MedAssistError::exit_code)
            .unwrap_or(exit_codes::GENERAL_ERROR);
        std::process::exit(code);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config.unwrap_or_else(Config::default_path);
    let config = Config::load_from(&config_path)?;
    tracing::debug!("Loaded config from {}", config_path.display());

    match cli.command {
        Commands::IngestKnowledge(args) => {
            commands::ingest::run_knowledge(args, &config, cli.format).await
        }
        Commands::IngestDoctors(args) => {
            commands::ingest::run_doctors(args, &config, cli.format).await
        }
        Commands::Search(args) => commands::search::run(args, &config, cli.format).await,
        Commands::Ask(args) => commands::ask::run(args, &config, cli.format).await,
        Commands::Chat => commands::chat::run(&config, cli.format).await,
        Commands::Config(args) => commands::config::run(args, &config, &config_path, cli.format),
    }
}
