//! LLM trait definitions

use super::{ChatRequest, RawToolCall};
use crate::error::Result;
use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;

/// Embedding generation trait
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Generate embedding for single text
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Generate embeddings for batch of texts
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Get embedding dimensions
    fn dimensions(&self) -> usize;

    /// Get model name
    fn model_name(&self) -> &str;
}

/// One unit of a streamed model response
#[derive(Debug, Clone, PartialEq)]
pub enum ModelIncrement {
    /// Assistant text to append to the visible answer
    Text(String),
    /// A fully assembled tool-call request
    ToolCall(RawToolCall),
}

/// Stream of increments produced by one chat-completion call
pub type IncrementStream = Pin<Box<dyn Stream<Item = Result<ModelIncrement>> + Send>>;

/// Streaming chat-completion trait
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Start a completion; increments arrive in the order the model produced them
    async fn stream_chat(&self, request: ChatRequest) -> Result<IncrementStream>;

    /// Get model name
    fn model_name(&self) -> &str;
}
