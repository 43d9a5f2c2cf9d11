//! MedAssist Core Library
//!
//! Core functionality for the medassist conversational health assistant.
//!
//! # Features
//! - Streaming chat completions against OpenAI-compatible endpoints
//! - Tool-call orchestration (knowledge base search, doctor search)
//! - Vector similarity retrieval over SQLite or Qdrant
//! - Token-bounded chunking with regrouping at query time
//! - Session-scoped conversation state with push or poll streaming

pub mod chat;
pub mod config;
pub mod error;
pub mod index;
pub mod llm;
pub mod search;

pub use chat::{
    Conversation, ConversationStore, CurrentSources, Message, MessageId, MessageSnapshot, Role,
    Session, StreamDispatcher, ToolOrchestrator, TurnEvent, TurnHandle, TurnOutcome,
};
pub use config::{
    Config, DispatcherConfig, LLMServiceConfig, OrchestratorConfig, RetrievalConfig,
    VectorBackend, VectorStoreConfig,
};
pub use error::{Error, MedAssistError, Result};
pub use index::{
    open_index, Distance, Point, PointId, QdrantIndex, ScoredPoint, SqliteIndex, VectorIndex,
};
pub use llm::{
    ChatMessage, ChatModel, ChatRequest, Embedder, HttpEmbedder, ModelIncrement,
    OpenAICompatClient, ToolCall, ToolKind, ToolSpec,
};
pub use search::{DoctorItem, KnowledgeItem, RetrievalService, SearchOutcome, SourceRecord};

/// Default cache directory name
pub const CACHE_DIR_NAME: &str = "medassist";

/// Default config directory name
pub const CONFIG_DIR_NAME: &str = "medassist";
