//! CLI argument definitions

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "medassist")]
#[command(
    author,
    version,
    about = "Conversational health assistant with knowledge base and doctor search"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output format
    #[arg(long, global = true, value_enum, default_value = "cli")]
    pub format: OutputFormat,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Config file (defaults to $MEDASSIST_CONFIG or the user config dir)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Import health articles from an RSS feed converted to JSON
    IngestKnowledge(IngestKnowledgeArgs),

    /// Import the doctor roster
    IngestDoctors(IngestDoctorsArgs),

    /// Run one retrieval tool directly
    Search(SearchArgs),

    /// Ask a single question and stream the answer
    Ask(AskArgs),

    /// Interactive conversation
    Chat,

    /// Show the effective configuration
    Config(ConfigArgs),
}

#[derive(Args)]
pub struct IngestKnowledgeArgs {
    /// Path to the RSS JSON export
    pub file: PathBuf,
}

#[derive(Args)]
pub struct IngestDoctorsArgs {
    /// JSON array of doctor records (defaults to the built-in roster)
    #[arg(long)]
    pub file: Option<PathBuf>,
}

#[derive(Args)]
pub struct SearchArgs {
    /// Which collection to search
    #[arg(value_enum)]
    pub target: SearchTarget,

    /// Search query
    #[arg(required = true)]
    pub query: Vec<String>,
}

#[derive(Args)]
pub struct AskArgs {
    /// Question for the assistant
    #[arg(required = true)]
    pub question: Vec<String>,
}

#[derive(Args)]
pub struct ConfigArgs {
    /// Write the effective configuration to the config path
    #[arg(long)]
    pub save: bool,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum SearchTarget {
    Knowledge,
    Doctors,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Cli,
    Json,
}
