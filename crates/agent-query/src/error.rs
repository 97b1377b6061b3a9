//! Error types for query resolution

use crate::verdict::VerdictParseError;
use agent_llm::LLMError;
use thiserror::Error;

/// Errors that end a resolution call
///
/// Execution failures of generated code are not errors: they become
/// [`ExecutionOutcome::Failure`](crate::ExecutionOutcome::Failure) and feed the
/// next reflection prompt.
#[derive(Debug, Error)]
pub enum QueryError {
    /// Chat or embedding transport failed after the adapter's own retries
    #[error("LLM error: {0}")]
    Llm(#[from] LLMError),

    /// Documentation search failed
    #[error("Retrieval error: {0}")]
    Retrieval(String),

    /// The judge answered with something that is not a verdict
    #[error("Judge verdict could not be parsed: {0}")]
    Verdict(#[from] VerdictParseError),

    /// A prompt template failed to render
    #[error("Prompt error: {0}")]
    Prompt(#[from] minijinja::Error),

    /// The code runner itself could not be used
    #[error("Sandbox unavailable: {0}")]
    Sandbox(String),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Filesystem error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error outside verdict parsing
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<agent_utils::ConfigError> for QueryError {
    fn from(err: agent_utils::ConfigError) -> Self {
        QueryError::Config(err.to_string())
    }
}

/// Result type alias for query operations
pub type Result<T> = std::result::Result<T, QueryError>;
