//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and environment variable overrides.

use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::storage::MetricLogConfig;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Metric log storage configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Directory for metric files, relative paths are taken from the
    /// current directory
    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    /// Directory for archived metric files (default: `<output_dir>/archive`)
    #[serde(default)]
    pub archive_dir: Option<String>,
}

fn default_output_dir() -> String {
    "metrics".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            archive_dir: None,
        }
    }
}

impl StorageConfig {
    /// Resolve paths against the current directory once and build the
    /// engine configuration
    pub fn to_log_config(&self) -> Result<MetricLogConfig, ConfigError> {
        let cwd = std::env::current_dir().map_err(|e| ConfigError::Io {
            path: PathBuf::from("."),
            error: e.to_string(),
        })?;
        Ok(self.to_log_config_in(&cwd))
    }

    /// Build the engine configuration with relative paths taken from `base`
    pub fn to_log_config_in(&self, base: &Path) -> MetricLogConfig {
        let output_dir = base.join(&self.output_dir);
        let config = MetricLogConfig::new(output_dir);

        match &self.archive_dir {
            Some(archive_dir) if !archive_dir.is_empty() => config.archive_dir(base.join(archive_dir)),
            _ => config,
        }
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

        Self::parse(&content).map_err(|error| ConfigError::Parse {
            path: path.to_path_buf(),
            error,
        })
    }

    fn parse(content: &str) -> Result<Self, String> {
        toml::from_str(content).map_err(|e| e.to_string())
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
            dirs::config_dir().map(|p| p.join("process-metrics").join("config.toml")),
            Some(PathBuf::from("/etc/process-metrics/config.toml")),
            Some(PathBuf::from("./config.toml")),
        ];

        for path_opt in config_paths.iter().flatten() {
            if path_opt.exists() {
                match Self::load_with_env(path_opt) {
                    Ok(config) => {
                        tracing::info!("Loaded config from {:?}", path_opt);
                        return config;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load config from {:?}: {}", path_opt, e);
                    }
                }
            }
        }

        tracing::debug!("Using default config with environment overrides");
        Self::from_env()
    }

    /// Apply environment variable overrides to an existing config
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        // Storage overrides
        if let Some(output_dir) = lookup("PROCESS_METRICS_OUTPUT_DIR") {
            self.storage.output_dir = output_dir;
        }
        if let Some(archive_dir) = lookup("PROCESS_METRICS_ARCHIVE_DIR") {
            self.storage.archive_dir = Some(archive_dir);
        }

        // Logging overrides
        if let Some(level) = lookup("PROCESS_METRICS_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = lookup("PROCESS_METRICS_LOG_FORMAT") {
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
}

/// Generate a default config file content
pub fn generate_default_config() -> String {
    r#"# Process Metrics Configuration
#
# Environment variables override these settings:
# - PROCESS_METRICS_OUTPUT_DIR
# - PROCESS_METRICS_ARCHIVE_DIR
# - PROCESS_METRICS_LOG_LEVEL
# - PROCESS_METRICS_LOG_FORMAT

[storage]
# Directory holding one <process model id>.met file per process model.
# Relative paths are resolved against the working directory.
output_dir = "metrics"

# Where archived metric files are moved to (default: <output_dir>/archive)
# archive_dir = "/var/lib/process-metrics/archive"

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log format: pretty (for development) or json (for production)
format = "pretty"
"#
    .to_string()
}
