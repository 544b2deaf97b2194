//! Configuration loader
//!
//! Loads application configuration from environment variables or files.
//!
//! ## Loading Strategy
//! 1. First, attempts to load from environment variables
//! 2. If incomplete, falls back to loading from file
//! 3. Probes multiple paths for config files
//! 4. Supports JSON and TOML formats
//!
//! ## Environment Variables
//! - `SEMESTRA_DB_PATH`: Database file path
//! - `SEMESTRA_DB_POOL_SIZE`: Connection pool size
//! - `SEMESTRA_UNDERSTANDING_API_URL`: Understanding-service endpoint
//! - `SEMESTRA_UNDERSTANDING_API_KEY`: API key (optional)
//! - `SEMESTRA_REQUEST_TIMEOUT_SECS`: Per-request timeout (optional)
//! - `SEMESTRA_SYNC_INTERVAL`: Sync interval in seconds
//! - `SEMESTRA_SYNC_ENABLED`: Whether scheduled sync is enabled
//! - `SEMESTRA_PROVIDER_RATE_PER_MINUTE`: Provider request budget (optional)
//! - `SEMESTRA_STORAGE_ROOT`: Uploaded document root directory (optional)

use std::path::{Path, PathBuf};

use semestra_domain::{
    AppConfig, DatabaseConfig, PipelineConfig, Result, SemestraError, StorageConfig, SyncConfig,
};

/// Load configuration with automatic fallback strategy.
///
/// # Errors
/// Returns `SemestraError::Config` if neither source yields a complete
/// configuration.
pub fn load() -> Result<AppConfig> {
    match load_from_env() {
        Ok(config) => {
            tracing::info!("Configuration loaded from environment variables");
            Ok(config)
        }
        Err(e) => {
            tracing::debug!(error = ?e, "Failed to load from environment, trying file");
            load_from_file(None)
        }
    }
}

/// Load configuration from environment variables. All required
/// variables must be present.
pub fn load_from_env() -> Result<AppConfig> {
    let db_path = env_var("SEMESTRA_DB_PATH")?;
    let db_pool_size = env_var("SEMESTRA_DB_POOL_SIZE").and_then(|s| {
        s.parse::<u32>().map_err(|e| SemestraError::Config(format!("Invalid pool size: {}", e)))
    })?;

    let understanding_api_url = env_var("SEMESTRA_UNDERSTANDING_API_URL")?;
    let understanding_api_key = std::env::var("SEMESTRA_UNDERSTANDING_API_KEY").ok();
    let request_timeout_secs = match std::env::var("SEMESTRA_REQUEST_TIMEOUT_SECS") {
        Ok(raw) => raw
            .parse::<u64>()
            .map_err(|e| SemestraError::Config(format!("Invalid request timeout: {}", e)))?,
        Err(_) => 60,
    };

    let sync_interval = env_var("SEMESTRA_SYNC_INTERVAL").and_then(|s| {
        s.parse::<u64>().map_err(|e| SemestraError::Config(format!("Invalid sync interval: {}", e)))
    })?;
    let sync_enabled = env_bool("SEMESTRA_SYNC_ENABLED", true);
    let provider_rate_per_minute = match std::env::var("SEMESTRA_PROVIDER_RATE_PER_MINUTE") {
        Ok(raw) => raw
            .parse::<u32>()
            .map_err(|e| SemestraError::Config(format!("Invalid provider rate: {}", e)))?,
        Err(_) => 60,
    };

    let storage_root =
        std::env::var("SEMESTRA_STORAGE_ROOT").unwrap_or_else(|_| "uploads".to_string());

    Ok(AppConfig {
        database: DatabaseConfig { path: db_path, pool_size: db_pool_size },
        pipeline: PipelineConfig {
            understanding_api_url,
            understanding_api_key,
            request_timeout_secs,
        },
        sync: SyncConfig {
            interval_seconds: sync_interval,
            enabled: sync_enabled,
            provider_rate_per_minute,
        },
        storage: StorageConfig { root: storage_root },
    })
}

/// Load configuration from a file. With no path, probes the standard
/// locations.
pub fn load_from_file(path: Option<PathBuf>) -> Result<AppConfig> {
    let config_path = match path {
        Some(p) => {
            if !p.exists() {
                return Err(SemestraError::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            p
        }
        None => probe_config_paths().ok_or_else(|| {
            SemestraError::Config(
                "No config file found in any of the standard locations".to_string(),
            )
        })?,
    };

    tracing::info!(path = %config_path.display(), "Loading configuration from file");

    let contents = std::fs::read_to_string(&config_path)
        .map_err(|e| SemestraError::Config(format!("Failed to read config file: {}", e)))?;

    parse_config(&contents, &config_path)
}

/// Parse configuration content; format detected by file extension.
fn parse_config(contents: &str, path: &Path) -> Result<AppConfig> {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("json");

    match extension {
        "toml" => toml::from_str(contents)
            .map_err(|e| SemestraError::Config(format!("Invalid TOML format: {}", e))),
        "json" => serde_json::from_str(contents)
            .map_err(|e| SemestraError::Config(format!("Invalid JSON format: {}", e))),
        _ => Err(SemestraError::Config(format!("Unsupported config format: {}", extension))),
    }
}

/// Probe standard locations for a configuration file.
pub fn probe_config_paths() -> Option<PathBuf> {
    let mut candidates = Vec::new();

    if let Ok(cwd) = std::env::current_dir() {
        candidates.extend(vec![
            cwd.join("config.json"),
            cwd.join("config.toml"),
            cwd.join("semestra.json"),
            cwd.join("semestra.toml"),
            cwd.join("../config.json"),
            cwd.join("../config.toml"),
        ]);
    }

    if let Ok(exe_path) = std::env::current_exe() {
        if let Some(exe_dir) = exe_path.parent() {
            candidates.push(exe_dir.join("config.json"));
            candidates.push(exe_dir.join("config.toml"));
        }
    }

    candidates.into_iter().find(|p| p.exists())
}

fn env_var(name: &str) -> Result<String> {
    std::env::var(name)
        .map_err(|_| SemestraError::Config(format!("Missing environment variable: {}", name)))
}

fn env_bool(name: &str, default: bool) -> bool {
    std::env::var(name)
        .map(|v| matches!(v.to_ascii_lowercase().as_str(), "true" | "1" | "yes"))
        .unwrap_or(default)
}
