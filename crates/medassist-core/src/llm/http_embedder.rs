//! HTTP-based embedder using an external OpenAI-compatible embeddings service

use super::{endpoint_url, Embedder};
use crate::config::LLMServiceConfig;
use crate::error::{MedAssistError, Result};
use crate::index::truncate_to_tokens;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Embedder that calls `<base>/embeddings` (DashScope, vLLM, OpenAI, etc.)
pub struct HttpEmbedder {
    http_client: reqwest::Client,
    config: LLMServiceConfig,
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: Vec<String>,
    dimensions: usize,
    encoding_format: &'static str,
}

#[derive(Deserialize)]
struct EmbedResponse {
    data: Vec<EmbedData>,
}

#[derive(Deserialize)]
struct EmbedData {
    #[serde(default)]
    index: Option<usize>,
    embedding: Vec<f32>,
}

impl HttpEmbedder {
    /// Create from configuration
    pub fn new(config: LLMServiceConfig) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| MedAssistError::Embedding(format!("failed to build client: {}", e)))?;

        Ok(Self {
            http_client,
            config,
        })
    }

    /// Create from environment variables
    pub fn from_env() -> Result<Self> {
        Self::new(LLMServiceConfig::default())
    }

    fn prepare(&self, text: &str) -> Result<String> {
        if text.trim().is_empty() {
            return Err(MedAssistError::InvalidInput(
                "cannot embed empty text".to_string(),
            ));
        }
        Ok(truncate_to_tokens(text, self.config.max_input_tokens).to_string())
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let results = self.embed_batch(&[text.to_string()]).await?;
        results
            .into_iter()
            .next()
            .ok_or_else(|| MedAssistError::Embedding("No embedding returned".to_string()))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let input = texts
            .iter()
            .map(|t| self.prepare(t))
            .collect::<Result<Vec<_>>>()?;

        let request = EmbedRequest {
            model: &self.config.embedding_model,
            input,
            dimensions: self.config.embedding_dimensions,
            encoding_format: "float",
        };

        let url = endpoint_url(self.config.embeddings_url(), "embeddings");
        tracing::debug!("Embedding {} texts via {}", texts.len(), url);

        let mut req = self.http_client.post(&url).json(&request);
        if let Some(ref api_key) = self.config.api_key {
            req = req.header("Authorization", format!("Bearer {}", api_key));
        }

        let response = req
            .send()
            .await
            .map_err(|e| MedAssistError::Embedding(format!("request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(MedAssistError::Embedding(format!(
                "Embedding service error (HTTP {}): {}",
                status, body
            )));
        }

        let parsed: EmbedResponse = response
            .json()
            .await
            .map_err(|e| MedAssistError::Embedding(format!("malformed response: {}", e)))?;

        collect_embeddings(parsed, texts.len(), self.config.embedding_dimensions)
    }

    fn dimensions(&self) -> usize {
        self.config.embedding_dimensions
    }

    fn model_name(&self) -> &str {
        &self.config.embedding_model
    }
}

fn collect_embeddings(
    mut response: EmbedResponse,
    expected_count: usize,
    dimensions: usize,
) -> Result<Vec<Vec<f32>>> {
    if response.data.len() != expected_count {
        return Err(MedAssistError::Embedding(format!(
            "expected {} embeddings, got {}",
            expected_count,
            response.data.len()
        )));
    }

    // Services may return entries out of order; `index` is authoritative when present
    if response.data.iter().all(|d| d.index.is_some()) {
        response.data.sort_by_key(|d| d.index);
    }

    response
        .data
        .into_iter()
        .map(|d| {
            if d.embedding.len() != dimensions {
                Err(MedAssistError::DimensionMismatch {
                    expected: dimensions,
                    actual: d.embedding.len(),
                })
            } else {
                Ok(d.embedding)
            }
        })
        .collect()
}
