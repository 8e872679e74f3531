//! Store configuration module.
//!
//! Handles loading, validating, and overriding `pixstore.toml`. Values are
//! layered: stock defaults, then the config file, then environment
//! variables.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! log_level = "info"            # Fallback when RUST_LOG is unset
//!
//! [storage]
//! path = "./upload"             # Permanent originals
//! temp_path = "./temp"          # Uploads awaiting promotion
//! catalog = "./catalog.json"    # Image metadata
//!
//! [server]
//! host = "localhost"            # Used to build image URLs
//! port = 8080
//!
//! [processing]
//! max_processes = 4             # Max parallel workers (omit for auto = CPU cores)
//! ```
//!
//! ## Environment Overrides
//!
//! | Variable | Key |
//! |---|---|
//! | `PIXSTORE_UPLOAD_PATH` | `storage.path` |
//! | `PIXSTORE_UPLOAD_TEMP_PATH` | `storage.temp_path` |
//! | `PIXSTORE_CATALOG` | `storage.catalog` |
//! | `PIXSTORE_HOST` | `server.host` |
//! | `PIXSTORE_PORT` | `server.port` |
//!
//! Unknown keys in the file are rejected to catch typos early.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Component, Path};
use thiserror::Error;

/// Config file read when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "pixstore.toml";

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Store configuration loaded from `pixstore.toml`.
///
/// All fields have defaults; a config file need only specify the values it
/// wants to override.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreConfig {
    /// Default tracing filter, used when `RUST_LOG` is unset.
    pub log_level: String,
    pub storage: StorageConfig,
    pub server: ServerConfig,
    pub processing: ProcessingConfig,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            storage: StorageConfig::default(),
            server: ServerConfig::default(),
            processing: ProcessingConfig::default(),
        }
    }
}

impl StoreConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let storage = &self.storage;
        for (key, value) in [
            ("storage.path", &storage.path),
            ("storage.temp_path", &storage.temp_path),
            ("storage.catalog", &storage.catalog),
            ("server.host", &self.server.host),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::Validation(format!("{key} must not be empty")));
            }
        }
        if lexical(&storage.path) == lexical(&storage.temp_path) {
            return Err(ConfigError::Validation(
                "storage.path and storage.temp_path must differ".into(),
            ));
        }
        if self.server.port == 0 {
            return Err(ConfigError::Validation(
                "server.port must be non-zero".into(),
            ));
        }
        if !LOG_LEVELS.contains(&self.log_level.as_str()) {
            return Err(ConfigError::Validation(format!(
                "log_level must be one of {}",
                LOG_LEVELS.join(", ")
            )));
        }
        Ok(())
    }

    /// Origin used to build absolute image URLs, e.g. `http://localhost:8080`.
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.server.host, self.server.port)
    }

    /// Apply `PIXSTORE_*` overrides looked up through `var`.
    pub fn apply_env<F>(&mut self, var: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = var("PIXSTORE_UPLOAD_PATH") {
            self.storage.path = v;
        }
        if let Some(v) = var("PIXSTORE_UPLOAD_TEMP_PATH") {
            self.storage.temp_path = v;
        }
        if let Some(v) = var("PIXSTORE_CATALOG") {
            self.storage.catalog = v;
        }
        if let Some(v) = var("PIXSTORE_HOST") {
            self.server.host = v;
        }
        if let Some(v) = var("PIXSTORE_PORT") {
            self.server.port = v.parse().map_err(|_| {
                ConfigError::Validation(format!("PIXSTORE_PORT is not a valid port: {v}"))
            })?;
        }
        Ok(())
    }
}

/// Where originals and metadata live on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageConfig {
    /// Directory for promoted (permanent) originals.
    pub path: String,
    /// Directory for fresh uploads.
    pub temp_path: String,
    /// JSON file holding image metadata.
    pub catalog: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: "./upload".to_string(),
            temp_path: "./temp".to_string(),
            catalog: "./catalog.json".to_string(),
        }
    }
}

/// Public address the images are served from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 8080,
        }
    }
}

/// Parallel processing settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Maximum number of parallel upload workers.
    /// When absent or null, defaults to the number of CPU cores.
    /// Values larger than the core count are clamped down.
    pub max_processes: Option<usize>,
}

/// Path components with `.` segments dropped, so `./upload` and `upload`
/// compare equal. Symlinks are caught when storage is opened.
fn lexical(path: &str) -> Vec<Component<'_>> {
    Path::new(path)
        .components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect()
}

/// Resolve the effective thread count from config.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)` (user can constrain down, not up)
pub fn effective_threads(config: &ProcessingConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config
        .max_processes
        .map(|n| n.clamp(1, cores))
        .unwrap_or(cores)
}

// =============================================================================
// Config loading
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
pub fn stock_defaults_value() -> toml::Value {
    toml::Value::try_from(StoreConfig::default()).expect("default config must serialize")
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Load the config file at `path` on top of stock defaults.
///
/// A missing file yields the defaults. Environment overrides are applied
/// through `var` before validation.
pub fn load_config_with<F>(path: &Path, var: F) -> Result<StoreConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let base = stock_defaults_value();
    let merged = if path.exists() {
        let content = fs::read_to_string(path)?;
        let overlay: toml::Value = toml::from_str(&content)?;
        merge_toml(base, overlay)
    } else {
        base
    };
    let mut config: StoreConfig = merged.try_into()?;
    config.apply_env(var)?;
    config.validate()?;
    Ok(config)
}

/// Load config from `path` with overrides from the process environment.
pub fn load_config(path: &Path) -> Result<StoreConfig, ConfigError> {
    load_config_with(path, |key| std::env::var(key).ok())
}

/// Returns a fully-commented stock `pixstore.toml` with all keys and explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# pixstore configuration
# ======================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults.
#
# Environment variables override file values:
#   PIXSTORE_UPLOAD_PATH, PIXSTORE_UPLOAD_TEMP_PATH, PIXSTORE_CATALOG,
#   PIXSTORE_HOST, PIXSTORE_PORT
#
# Unknown keys will cause an error.

# Default log filter when RUST_LOG is not set: trace, debug, info, warn, error.
log_level = "info"

# ---------------------------------------------------------------------------
# Storage
# ---------------------------------------------------------------------------
[storage]
# Promoted originals.
path = "./upload"

# Fresh uploads, until promoted. Must differ from `path`.
temp_path = "./temp"

# Image metadata catalog (JSON).
catalog = "./catalog.json"

# ---------------------------------------------------------------------------
# Server address, used to build image URLs
# ---------------------------------------------------------------------------
[server]
host = "localhost"
port = 8080

# ---------------------------------------------------------------------------
# Processing
# ---------------------------------------------------------------------------
[processing]
# Maximum parallel upload workers.
# Omit or comment out to auto-detect (= number of CPU cores).
# max_processes = 4
"##
}
