//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and environment variable overrides.

use crate::storage::{self, CompressionType, SyncMode, DEFAULT_MAX_OP_N};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Storage configuration as written in the config file
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// Logged ops per fragment before a snapshot
    #[serde(default = "default_max_op_n")]
    pub max_op_n: usize,

    /// every_write, batched or none
    #[serde(default = "default_sync_mode")]
    pub sync_mode: String,

    /// Compress snapshot bodies with LZ4
    #[serde(default = "default_compression")]
    pub compression: bool,
}

fn default_data_dir() -> String {
    dirs::data_local_dir()
        .map(|p| p.join("bitframe").to_string_lossy().to_string())
        .unwrap_or_else(|| "./bitframe_data".to_string())
}

fn default_max_op_n() -> usize {
    DEFAULT_MAX_OP_N
}

fn default_sync_mode() -> String {
    "batched".to_string()
}

fn default_compression() -> bool {
    true
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            max_op_n: default_max_op_n(),
            sync_mode: default_sync_mode(),
            compression: default_compression(),
        }
    }
}

impl StorageConfig {
    /// Expand a leading `~` in the data directory
    pub fn data_path(&self) -> PathBuf {
        match self.data_dir.strip_prefix("~/") {
            Some(rest) => dirs::home_dir()
                .map(|home| home.join(rest))
                .unwrap_or_else(|| PathBuf::from(&self.data_dir)),
            None => PathBuf::from(&self.data_dir),
        }
    }

    /// Runtime storage settings
    pub fn to_storage_config(&self) -> Result<storage::StorageConfig, ConfigError> {
        let sync_mode: SyncMode = self.sync_mode.parse().map_err(ConfigError::Invalid)?;
        Ok(storage::StorageConfig {
            data_dir: self.data_path(),
            max_op_n: self.max_op_n.max(1),
            sync_mode,
            compression: if self.compression {
                CompressionType::Lz4
            } else {
                CompressionType::None
            },
        })
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        Ok(config)
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    }

    /// Load configuration with environment variable overrides
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from default locations or environment
    pub fn load_default() -> Self {
        let config_paths = [
            dirs::config_dir().map(|p| p.join("bitframe").join("config.toml")),
            Some(PathBuf::from("./bitframe.toml")),
        ];

        for path in config_paths.iter().flatten() {
            if path.exists() {
                match Self::load_with_env(path) {
                    Ok(config) => {
                        tracing::info!("Loaded config from {:?}", path);
                        return config;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load config from {:?}: {}", path, e);
                    }
                }
            }
        }

        Self::from_env()
    }

    /// Apply environment variable overrides to an existing config
    fn apply_env_overrides(&mut self) {
        if let Ok(data_dir) = std::env::var("BITFRAME_DATA_DIR") {
            self.storage.data_dir = data_dir;
        }
        if let Ok(max_op_n) = std::env::var("BITFRAME_MAX_OP_N") {
            match max_op_n.parse() {
                Ok(n) => self.storage.max_op_n = n,
                Err(_) => tracing::warn!("Ignoring invalid BITFRAME_MAX_OP_N: {}", max_op_n),
            }
        }
        if let Ok(sync_mode) = std::env::var("BITFRAME_SYNC_MODE") {
            self.storage.sync_mode = sync_mode;
        }

        if let Ok(level) = std::env::var("BITFRAME_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("BITFRAME_LOG_FORMAT") {
            self.logging.format = format;
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config file {path:?}: {error}")]
    Parse { path: PathBuf, error: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Generate a default config file content
pub fn generate_default_config() -> String {
    r#"# bitframe configuration
#
# Environment variables override these settings:
# - BITFRAME_DATA_DIR
# - BITFRAME_MAX_OP_N
# - BITFRAME_SYNC_MODE
# - BITFRAME_LOG_LEVEL
# - BITFRAME_LOG_FORMAT

[storage]
# Directory holding one subdirectory per index
data_dir = "~/.local/share/bitframe"

# Logged operations per fragment before it is snapshotted
max_op_n = 2000

# Op log fsync: every_write, batched or none
sync_mode = "batched"

# LZ4-compress fragment snapshots
compression = true

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log format: pretty (for development) or json (for production)
format = "pretty"
"#
    .to_string()
}
