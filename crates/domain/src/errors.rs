//! Error types used throughout the application

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for Semestra
#[derive(Error, Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "message")]
pub enum SemestraError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unsupported document format: {0}")]
    UnsupportedFormat(String),

    #[error("Empty document: {0}")]
    EmptyDocument(String),

    #[error("AI processing error: {0}")]
    AiProcessing(String),

    #[error("Service unavailable: {message}")]
    ServiceUnavailable {
        message: String,
        /// Provider-indicated backoff, when present (e.g. Retry-After on 429)
        retry_after_secs: Option<u64>,
    },

    #[error("Duplicate detected: {0}")]
    DuplicateDetected(String),

    #[error("Materialization error: {0}")]
    Materialization(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl SemestraError {
    /// Transient errors are retried by the orchestrator with backoff;
    /// everything else fails the job immediately.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::ServiceUnavailable { .. })
    }
}

/// Result type alias for Semestra operations
pub type Result<T> = std::result::Result<T, SemestraError>;
