//! Sync-specific error types
//!
//! Provides error classification for calendar sync operations with
//! retry metadata. Quota errors carry the provider-indicated backoff;
//! authentication errors disable the integration until external
//! re-authorization; token invalidation triggers a full re-fetch.

use semestra_domain::SemestraError;
use thiserror::Error;

/// Categories of sync errors for retry logic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncErrorCategory {
    /// Authentication failures - integration disabled until re-auth
    Authentication,
    /// Provider quota exhausted - delayed retry
    RateLimit,
    /// Server errors (5xx) - retryable
    Server,
    /// Client errors (4xx except auth) - non-retryable
    Client,
    /// Network/connection errors - retryable
    Network,
    /// Local persistence errors
    Database,
    /// Configuration errors - non-retryable
    Config,
}

/// Sync operation errors
#[derive(Debug, Clone, Error)]
pub enum SyncError {
    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Rate limit exceeded: {message}")]
    RateLimit {
        message: String,
        /// Provider-indicated backoff
        retry_after_secs: Option<u64>,
    },

    #[error("Server error: {0}")]
    Server(String),

    #[error("Client error: {0}")]
    Client(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Remote resource not found: {0}")]
    NotFound(String),

    #[error("Sync token no longer valid")]
    TokenInvalid,

    #[error("Operation cancelled")]
    Cancelled,
}

/// Result type alias for sync operations
pub type SyncResult<T> = std::result::Result<T, SyncError>;

impl SyncError {
    /// Get the error category for this error
    pub fn category(&self) -> SyncErrorCategory {
        match self {
            Self::Auth(_) => SyncErrorCategory::Authentication,
            Self::RateLimit { .. } => SyncErrorCategory::RateLimit,
            Self::Server(_) => SyncErrorCategory::Server,
            Self::Client(_) | Self::NotFound(_) | Self::TokenInvalid => SyncErrorCategory::Client,
            Self::Network(_) => SyncErrorCategory::Network,
            Self::Database(_) => SyncErrorCategory::Database,
            Self::Config(_) | Self::Cancelled => SyncErrorCategory::Config,
        }
    }

    /// Whether a later pass may succeed without human intervention
    pub fn should_retry(&self) -> bool {
        matches!(
            self.category(),
            SyncErrorCategory::RateLimit | SyncErrorCategory::Server | SyncErrorCategory::Network
        )
    }

    /// Suggested retry delay in seconds; quota errors use the
    /// provider's hint when present.
    pub fn retry_delay_secs(&self) -> u64 {
        match self {
            Self::RateLimit { retry_after_secs, .. } => retry_after_secs.unwrap_or(60),
            _ => match self.category() {
                SyncErrorCategory::Server => 10,
                SyncErrorCategory::Network => 5,
                SyncErrorCategory::Database => 2,
                _ => 0,
            },
        }
    }
}

/// Convert from SemestraError to SyncError
impl From<SemestraError> for SyncError {
    fn from(err: SemestraError) -> Self {
        match err {
            SemestraError::Database(message) => Self::Database(message),
            SemestraError::Config(message) => Self::Config(message),
            SemestraError::Network(message) => Self::Network(message),
            SemestraError::Auth(message) => Self::Auth(message),
            SemestraError::NotFound(message) => Self::NotFound(message),
            SemestraError::ServiceUnavailable { message, retry_after_secs } => {
                Self::RateLimit { message, retry_after_secs }
            }
            other => Self::Client(other.to_string()),
        }
    }
}
