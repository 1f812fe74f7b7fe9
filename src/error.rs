//! Error types for exercise-forge operations.
//!
//! Defines error types for the major subsystems:
//! - LLM API interactions
//! - Exercise extraction, artifact materialization and syntax validation
//! - Chat history persistence

use thiserror::Error;

/// Errors that can occur during LLM operations.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("Missing API key: {0} environment variable not set")]
    MissingApiKey(String),

    #[error("Missing API base URL: LITELLM_API_BASE environment variable not set")]
    MissingApiBase,

    #[error("HTTP request failed: {0}")]
    RequestFailed(String),

    #[error("Failed to parse LLM response: {0}")]
    ParseError(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Response blocked by provider: {0}")]
    Blocked(String),

    #[error("API error ({code}): {message}")]
    ApiError { code: u16, message: String },
}

impl LlmError {
    /// Whether the failure came from the transport or the service rather than
    /// from a malformed request.
    pub fn is_transient(&self) -> bool {
        match self {
            LlmError::RequestFailed(_) | LlmError::RateLimited(_) => true,
            LlmError::ApiError { code, .. } => *code >= 500 || *code == 429,
            _ => false,
        }
    }
}

/// Errors raised by a single generation attempt.
///
/// Every variant is caught by the orchestrator and turned into a retry; none
/// of them reaches the caller of `generate`.
#[derive(Debug, Error)]
pub enum ExerciseError {
    /// The model call failed (network or service error).
    #[error("Model call failed: {0}")]
    TransientModel(#[from] LlmError),

    /// No well-formed structured payload in the model reply.
    #[error("Failed to parse exercise payload: {0}")]
    Parse(String),

    /// The synthetic data file could not be written.
    #[error("Failed to write artifact '{name}': {reason}")]
    ArtifactWrite { name: String, reason: String },

    /// The syntax checker could not be run at all.
    #[error("Syntax validation tool unavailable: {0}")]
    ValidationTool(String),
}

/// Result type alias for exercise operations.
pub type ExerciseResult<T> = Result<T, ExerciseError>;

/// Errors that can occur while reading or appending chat history.
#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Query failed: {0}")]
    QueryFailed(#[from] sqlx::Error),

    #[error("Invalid history record: {0}")]
    InvalidRecord(String),
}
