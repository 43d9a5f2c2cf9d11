//! Ingestion commands

use crate::app::{IngestDoctorsArgs, IngestKnowledgeArgs, OutputFormat};
use crate::output;
use anyhow::{Context, Result};
use medassist_core::index::{
    demo_doctors, ingest_articles, ingest_doctors, load_doctor_records, load_rss_articles,
};
use medassist_core::{open_index, Config, Embedder, HttpEmbedder};

pub async fn run_knowledge(
    args: IngestKnowledgeArgs,
    config: &Config,
    format: OutputFormat,
) -> Result<()> {
    let raw = std::fs::read_to_string(&args.file)
        .with_context(|| format!("Failed to read {}", args.file.display()))?;
    let articles = load_rss_articles(&raw)?;
    if format == OutputFormat::Cli {
        eprintln!("Loaded {} articles from {}", articles.len(), args.file.display());
    }

    let embedder = HttpEmbedder::new(config.llm.clone())?;
    let index = open_index(&config.vector_store)?;
    let report = ingest_articles(
        &embedder,
        index.as_ref(),
        &config.retrieval.knowledge_collection,
        &articles,
        config.retrieval.chunk_tokens,
    )
    .await?;

    print!("{}", output::format_report(&report, format));
    Ok(())
}

pub async fn run_doctors(
    args: IngestDoctorsArgs,
    config: &Config,
    format: OutputFormat,
) -> Result<()> {
    let doctors = match &args.file {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            load_doctor_records(&raw)?
        }
        None => demo_doctors(),
    };

    let embedder = HttpEmbedder::new(config.llm.clone())?;
    tracing::debug!(
        "Embedding {} doctors with {}",
        doctors.len(),
        embedder.model_name()
    );
    let index = open_index(&config.vector_store)?;
    let report = ingest_doctors(
        &embedder,
        index.as_ref(),
        &config.retrieval.doctor_collection,
        &doctors,
    )
    .await?;

    print!("{}", output::format_report(&report, format));
    Ok(())
}
