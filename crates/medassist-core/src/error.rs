//! Error types for medassist

use thiserror::Error;

/// Result type alias using MedAssistError
pub type Result<T> = std::result::Result<T, MedAssistError>;

/// Error type alias for convenience
pub type Error = MedAssistError;

/// Exit codes for CLI
pub mod exit_codes {
    pub const SUCCESS: i32 = 0;
    pub const GENERAL_ERROR: i32 = 1;
    pub const NOT_FOUND: i32 = 2;
    pub const INVALID_INPUT: i32 = 3;
}

/// Main error type for medassist
#[derive(Debug, Error)]
pub enum MedAssistError {
    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Index error: {0}")]
    Index(String),

    #[error("Model call error: {0}")]
    ModelCall(String),

    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Invalid arguments for tool {tool}: {reason}")]
    InvalidToolArguments { tool: String, reason: String },

    #[error("Collection not found: {0}")]
    CollectionNotFound(String),

    #[error("Dimension mismatch: collection expects {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Message not found: {0}")]
    MessageNotFound(usize),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Turn cancelled")]
    Cancelled,

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl MedAssistError {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::CollectionNotFound(_) | Self::SessionNotFound(_) | Self::MessageNotFound(_) => {
                exit_codes::NOT_FOUND
            }
            Self::InvalidInput(_) | Self::Config(_) => exit_codes::INVALID_INPUT,
            _ => exit_codes::GENERAL_ERROR,
        }
    }

    /// Whether this error belongs to the vector store family
    pub fn is_index_error(&self) -> bool {
        matches!(
            self,
            Self::Index(_)
                | Self::CollectionNotFound(_)
                | Self::DimensionMismatch { .. }
                | Self::Database(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(
            MedAssistError::CollectionNotFound("kb".into()).exit_code(),
            exit_codes::NOT_FOUND
        );
        assert_eq!(
            MedAssistError::InvalidInput("empty".into()).exit_code(),
            exit_codes::INVALID_INPUT
        );
        assert_eq!(
            MedAssistError::Embedding("timeout".into()).exit_code(),
            exit_codes::GENERAL_ERROR
        );
    }

    #[test]
    fn test_index_error_family() {
        assert!(MedAssistError::DimensionMismatch {
            expected: 1024,
            actual: 3
        }
        .is_index_error());
        assert!(!MedAssistError::ModelCall("boom".into()).is_index_error());
    }
}
