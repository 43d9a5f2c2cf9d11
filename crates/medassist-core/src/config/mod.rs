//! Configuration management

mod prompt;

pub use prompt::DEFAULT_SYSTEM_PROMPT;

use crate::error::{MedAssistError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Chat and embedding service configuration
    #[serde(default)]
    pub llm: LLMServiceConfig,

    /// Vector store configuration
    #[serde(default)]
    pub vector_store: VectorStoreConfig,

    /// Retrieval tuning
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// Tool-call loop configuration
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,

    /// Snapshot streaming configuration
    #[serde(default)]
    pub dispatcher: DispatcherConfig,
}

/// LLM service configuration for external inference
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMServiceConfig {
    /// Base URL of the OpenAI-compatible chat service
    pub url: String,

    /// Model name for chat completions
    #[serde(default = "default_chat_model")]
    pub model: String,

    /// Base URL for embeddings service (can be different from chat URL)
    #[serde(default)]
    pub embedding_url: Option<String>,

    /// Model name for embeddings
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    /// Embedding dimensions; must match the target collections
    #[serde(default = "default_embedding_dimensions")]
    pub embedding_dimensions: usize,

    /// Inputs longer than this many tokens are trimmed before embedding
    #[serde(default = "default_max_input_tokens")]
    pub max_input_tokens: usize,

    /// API key (optional, for authenticated services)
    #[serde(default)]
    pub api_key: Option<String>,

    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl LLMServiceConfig {
    /// Get the embeddings URL (falls back to main URL if not specified)
    pub fn embeddings_url(&self) -> &str {
        self.embedding_url.as_deref().unwrap_or(&self.url)
    }
}

impl Default for LLMServiceConfig {
    fn default() -> Self {
        Self {
            url: std::env::var("MEDASSIST_LLM_URL").unwrap_or_else(|_| {
                "https://dashscope-intl.aliyuncs.com/compatible-mode/v1".to_string()
            }),
            model: default_chat_model(),
            embedding_url: std::env::var("MEDASSIST_EMBEDDING_URL").ok(),
            embedding_model: default_embedding_model(),
            embedding_dimensions: default_embedding_dimensions(),
            max_input_tokens: default_max_input_tokens(),
            api_key: std::env::var("MEDASSIST_LLM_API_KEY").ok(),
            timeout_secs: default_timeout(),
        }
    }
}

fn default_chat_model() -> String {
    std::env::var("MEDASSIST_LLM_MODEL").unwrap_or_else(|_| "qwen-plus".to_string())
}

fn default_embedding_model() -> String {
    std::env::var("MEDASSIST_EMBEDDING_MODEL").unwrap_or_else(|_| "text-embedding-v3".to_string())
}

fn default_embedding_dimensions() -> usize {
    std::env::var("MEDASSIST_EMBEDDING_DIMS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(1024)
}

fn default_max_input_tokens() -> usize {
    8192
}

fn default_timeout() -> u64 {
    60
}

/// Which vector database backs the index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VectorBackend {
    Sqlite,
    Qdrant,
}

impl std::str::FromStr for VectorBackend {
    type Err = MedAssistError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "sqlite" => Ok(Self::Sqlite),
            "qdrant" => Ok(Self::Qdrant),
            other => Err(MedAssistError::Config(format!(
                "unknown vector backend '{}'",
                other
            ))),
        }
    }
}

/// Vector store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorStoreConfig {
    #[serde(default = "default_backend")]
    pub backend: VectorBackend,

    #[serde(default = "default_qdrant_url")]
    pub qdrant_url: String,

    #[serde(default)]
    pub qdrant_api_key: Option<String>,

    /// Path of the local SQLite index
    #[serde(default = "default_sqlite_path")]
    pub sqlite_path: PathBuf,
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            qdrant_url: default_qdrant_url(),
            qdrant_api_key: std::env::var("MEDASSIST_QDRANT_API_KEY").ok(),
            sqlite_path: default_sqlite_path(),
        }
    }
}

fn default_backend() -> VectorBackend {
    std::env::var("MEDASSIST_VECTOR_BACKEND")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(VectorBackend::Sqlite)
}

fn default_qdrant_url() -> String {
    std::env::var("MEDASSIST_QDRANT_URL").unwrap_or_else(|_| "http://localhost:6333".to_string())
}

fn default_sqlite_path() -> PathBuf {
    std::env::var("MEDASSIST_DB")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            dirs::cache_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(crate::CACHE_DIR_NAME)
                .join("vectors.sqlite")
        })
}

/// Retrieval tuning. Thresholds differ per collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    #[serde(default = "default_knowledge_collection")]
    pub knowledge_collection: String,

    #[serde(default = "default_doctor_collection")]
    pub doctor_collection: String,

    #[serde(default = "default_limit")]
    pub knowledge_limit: usize,

    #[serde(default = "default_limit")]
    pub doctor_limit: usize,

    #[serde(default = "default_knowledge_threshold")]
    pub knowledge_threshold: f32,

    #[serde(default = "default_doctor_threshold")]
    pub doctor_threshold: f32,

    /// Decimal places kept in `relevance_score`; `None` keeps raw scores
    #[serde(default = "default_score_decimals")]
    pub score_decimals: Option<u32>,

    /// Maximum tokens per stored knowledge chunk
    #[serde(default = "default_chunk_tokens")]
    pub chunk_tokens: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            knowledge_collection: default_knowledge_collection(),
            doctor_collection: default_doctor_collection(),
            knowledge_limit: default_limit(),
            doctor_limit: default_limit(),
            knowledge_threshold: default_knowledge_threshold(),
            doctor_threshold: default_doctor_threshold(),
            score_decimals: default_score_decimals(),
            chunk_tokens: default_chunk_tokens(),
        }
    }
}

fn default_knowledge_collection() -> String {
    "knowledge_base_collection".to_string()
}

fn default_doctor_collection() -> String {
    "doctor_collection".to_string()
}

fn default_limit() -> usize {
    3
}

fn default_knowledge_threshold() -> f32 {
    0.6
}

fn default_doctor_threshold() -> f32 {
    0.5
}

fn default_score_decimals() -> Option<u32> {
    Some(3)
}

fn default_chunk_tokens() -> usize {
    crate::index::MAX_CHUNK_TOKENS
}

/// Tool-call loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Maximum tool round-trips per turn before the turn is closed
    #[serde(default = "default_max_tool_rounds")]
    pub max_tool_rounds: usize,

    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,

    /// Appended to the assistant message when a turn fails
    #[serde(default = "default_apology")]
    pub apology: String,

    /// Appended when the model keeps requesting tools past the cap
    #[serde(default = "default_round_limit_message")]
    pub round_limit_message: String,

    /// Used when a turn completes without any text
    #[serde(default = "default_empty_answer_message")]
    pub empty_answer_message: String,

    /// A model stream silent for this long fails the turn
    #[serde(default = "default_stream_idle_timeout_secs")]
    pub stream_idle_timeout_secs: u64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_tool_rounds: default_max_tool_rounds(),
            system_prompt: default_system_prompt(),
            apology: default_apology(),
            round_limit_message: default_round_limit_message(),
            empty_answer_message: default_empty_answer_message(),
            stream_idle_timeout_secs: default_stream_idle_timeout_secs(),
        }
    }
}

fn default_max_tool_rounds() -> usize {
    4
}

fn default_stream_idle_timeout_secs() -> u64 {
    60
}

fn default_system_prompt() -> String {
    DEFAULT_SYSTEM_PROMPT.to_string()
}

fn default_apology() -> String {
    "I apologize, but I encountered an error while processing your request. Please try again."
        .to_string()
}

fn default_round_limit_message() -> String {
    "I apologize, but I couldn't complete the search for your request. Please try rephrasing your question."
        .to_string()
}

fn default_empty_answer_message() -> String {
    "I'm sorry, I couldn't find an answer to that. Could you rephrase your question?".to_string()
}

/// Snapshot streaming configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatcherConfig {
    /// Interval used by the polling strategy
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

fn default_poll_interval_ms() -> u64 {
    100
}

impl Config {
    /// Load config from default path
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::default_path())
    }

    /// Load config from an explicit path; a missing file yields defaults
    pub fn load_from(path: &Path) -> Result<Self> {
        let config = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            serde_yaml::from_str(&content)?
        } else {
            Config::default()
        };
        config.validate()?;
        Ok(config)
    }

    /// Save config to default path
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::default_path())
    }

    /// Save config to an explicit path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get default config path (`MEDASSIST_CONFIG` overrides)
    pub fn default_path() -> PathBuf {
        if let Ok(path) = std::env::var("MEDASSIST_CONFIG") {
            return PathBuf::from(path);
        }
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(crate::CONFIG_DIR_NAME)
            .join("config.yml")
    }

    /// Reject values the rest of the system cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.llm.embedding_dimensions == 0 {
            return Err(MedAssistError::Config(
                "llm.embedding_dimensions must be greater than zero".to_string(),
            ));
        }
        if self.orchestrator.stream_idle_timeout_secs == 0 {
            return Err(MedAssistError::Config(
                "orchestrator.stream_idle_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.retrieval.chunk_tokens == 0 {
            return Err(MedAssistError::Config(
                "retrieval.chunk_tokens must be greater than zero".to_string(),
            ));
        }
        for (name, value) in [
            ("knowledge_threshold", self.retrieval.knowledge_threshold),
            ("doctor_threshold", self.retrieval.doctor_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(MedAssistError::Config(format!(
                    "retrieval.{} must be within [0, 1], got {}",
                    name, value
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.retrieval.knowledge_limit, 3);
        assert_eq!(config.retrieval.knowledge_threshold, 0.6);
        assert_eq!(config.retrieval.doctor_threshold, 0.5);
        assert_eq!(config.orchestrator.max_tool_rounds, 4);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join("config.yml");

        let mut config = Config::default();
        config.retrieval.knowledge_threshold = 0.55;
        config.retrieval.score_decimals = None;
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.retrieval.knowledge_threshold, 0.55);
        assert_eq!(loaded.retrieval.score_decimals, None);
    }

    #[test]
    fn test_zero_idle_timeout_rejected() {
        let mut config = Config::default();
        assert_eq!(config.orchestrator.stream_idle_timeout_secs, 60);
        config.orchestrator.stream_idle_timeout_secs = 0;
        assert!(matches!(config.validate(), Err(MedAssistError::Config(_))));
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let temp = TempDir::new().unwrap();
        let config = Config::load_from(&temp.path().join("absent.yml")).unwrap();
        assert_eq!(config.retrieval.doctor_collection, "doctor_collection");
    }

    #[test]
    fn test_partial_yaml_fills_defaults() {
        let yaml = "retrieval:\n  doctor_threshold: 0.4\n";
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.retrieval.doctor_threshold, 0.4);
        assert_eq!(config.retrieval.knowledge_threshold, 0.6);
        assert_eq!(config.dispatcher.poll_interval_ms, 100);
    }

    #[test]
    fn test_rejects_out_of_range_threshold() {
        let mut config = Config::default();
        config.retrieval.knowledge_threshold = 1.5;
        assert!(matches!(
            config.validate(),
            Err(MedAssistError::Config(_))
        ));
    }

    #[test]
    fn test_backend_parse() {
        assert_eq!("Qdrant".parse::<VectorBackend>().unwrap(), VectorBackend::Qdrant);
        assert!("milvus".parse::<VectorBackend>().is_err());
    }
}
