//! Scheduler error types

use std::time::Duration;

use thiserror::Error;

/// Errors from scheduler lifecycle operations
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("Scheduler is already running")]
    AlreadyRunning,

    #[error("Scheduler is not running")]
    NotRunning,

    #[error("Operation timed out after {duration:?}")]
    Timeout {
        duration: Duration,
        #[source]
        source: tokio::time::error::Elapsed,
    },

    #[error("Scheduler task failed: {0}")]
    TaskFailed(String),
}

/// Result type alias for scheduler operations
pub type SchedulerResult<T> = std::result::Result<T, SchedulerError>;

impl From<tokio::task::JoinError> for SchedulerError {
    fn from(value: tokio::task::JoinError) -> Self {
        SchedulerError::TaskFailed(value.to_string())
    }
}
