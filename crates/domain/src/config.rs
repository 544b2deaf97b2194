//! Application configuration structures
//!
//! Populated by the infra config loader from environment variables or a
//! TOML/JSON file.

use serde::{Deserialize, Serialize};

/// Top-level application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub pipeline: PipelineConfig,
    pub sync: SyncConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database file path
    pub path: String,
    /// Connection pool size
    pub pool_size: u32,
}

/// Extraction pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Base URL of the external understanding service
    pub understanding_api_url: String,
    /// API key for the understanding service, when required
    #[serde(default)]
    pub understanding_api_key: Option<String>,
    /// Timeout applied to each understanding-service request
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

/// Calendar sync configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Interval between scheduled sync passes, in seconds
    pub interval_seconds: u64,
    /// Whether scheduled sync is enabled
    pub enabled: bool,
    /// Per-provider request budget per minute
    #[serde(default = "default_provider_rate_per_minute")]
    pub provider_rate_per_minute: u32,
}

/// Uploaded document storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root directory the document store reads from
    pub root: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self { root: "uploads".to_string() }
    }
}

fn default_request_timeout_secs() -> u64 {
    60
}

fn default_provider_rate_per_minute() -> u32 {
    60
}
