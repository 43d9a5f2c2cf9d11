//! Command implementations

pub mod ask;
pub mod chat;
pub mod config;
pub mod ingest;
pub mod search;

use anyhow::Result;
use medassist_core::{
    open_index, Config, HttpEmbedder, OpenAICompatClient, RetrievalService, ToolOrchestrator,
};
use std::sync::Arc;

/// Embedder and index wired from config
pub fn build_retrieval(config: &Config) -> Result<Arc<RetrievalService>> {
    let embedder = Arc::new(HttpEmbedder::new(config.llm.clone())?);
    let index = open_index(&config.vector_store)?;
    tracing::debug!(
        "Using {} index with embedding model {}",
        index.backend_name(),
        config.llm.embedding_model
    );
    Ok(Arc::new(RetrievalService::new(
        embedder,
        index,
        config.retrieval.clone(),
    )))
}

/// Chat model plus retrieval, ready to run turns
pub fn build_orchestrator(config: &Config) -> Result<Arc<ToolOrchestrator>> {
    let retrieval = build_retrieval(config)?;
    let model = Arc::new(OpenAICompatClient::new(config.llm.clone())?);
    Ok(Arc::new(ToolOrchestrator::new(
        model,
        retrieval,
        config.orchestrator.clone(),
    )))
}
