//! Config command

use crate::app::{ConfigArgs, OutputFormat};
use anyhow::Result;
use medassist_core::Config;
use std::path::Path;

const MASK: &str = "********";

pub fn run(args: ConfigArgs, config: &Config, path: &Path, format: OutputFormat) -> Result<()> {
    if args.save {
        config.save_to(path)?;
        eprintln!("Saved config to {}", path.display());
    }

    // Keys never reach the terminal
    let mut shown = config.clone();
    if shown.llm.api_key.is_some() {
        shown.llm.api_key = Some(MASK.to_string());
    }
    if shown.vector_store.qdrant_api_key.is_some() {
        shown.vector_store.qdrant_api_key = Some(MASK.to_string());
    }

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&shown)?),
        OutputFormat::Cli => {
            println!("# {}", path.display());
            print!("{}", serde_yaml::to_string(&shown)?);
        }
    }
    Ok(())
}
