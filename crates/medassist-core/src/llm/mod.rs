//! LLM integration
//!
//! Provides traits and implementations for:
//! - Streaming chat completions with tool calls (OpenAI-compatible)
//! - Embedding generation via external services
//! - The two retrieval tools offered to the model

mod client;
mod http_embedder;
mod sse;
mod tools;
mod traits;

pub use client::{
    endpoint_url, ChatMessage, ChatRequest, MetricsSnapshot, OpenAICompatClient, Role,
    WireFunction, WireToolCall,
};
pub use http_embedder::HttpEmbedder;
pub use sse::SseDecoder;
pub use tools::{RawToolCall, ToolCall, ToolKind, ToolSpec};
pub use traits::*;
