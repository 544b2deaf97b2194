//! Tracing setup and logging helpers

use std::time::Duration;

use semestra_domain::SemestraError;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Initialize the global tracing subscriber. `RUST_LOG` controls the
/// filter; defaults to info for the workspace crates.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,semestra_core=info,semestra_infra=info"));

    let _ = tracing_subscriber::fmt().with_env_filter(filter).with_target(true).try_init();
}

/// Log the outcome of a command execution with structured fields.
#[inline]
pub fn log_command_execution(command: &str, elapsed: Duration, success: bool) {
    let duration_ms = elapsed.as_millis() as u64;

    if success {
        info!(command, duration_ms, "command_execution_success");
    } else {
        warn!(command, duration_ms, "command_execution_failure");
    }
}

/// Convert a `SemestraError` into a stable label suitable for logging.
#[inline]
pub fn error_label(error: &SemestraError) -> &'static str {
    match error {
        SemestraError::Validation(_) => "validation",
        SemestraError::UnsupportedFormat(_) => "unsupported_format",
        SemestraError::EmptyDocument(_) => "empty_document",
        SemestraError::AiProcessing(_) => "ai_processing",
        SemestraError::ServiceUnavailable { .. } => "service_unavailable",
        SemestraError::DuplicateDetected(_) => "duplicate_detected",
        SemestraError::Materialization(_) => "materialization",
        SemestraError::Database(_) => "database",
        SemestraError::Config(_) => "config",
        SemestraError::Network(_) => "network",
        SemestraError::Auth(_) => "auth",
        SemestraError::NotFound(_) => "not_found",
        SemestraError::InvalidInput(_) => "invalid_input",
        SemestraError::Internal(_) => "internal",
    }
}
