//! Configuration management for the tftpvault daemon.
//!
//! TOML-based configuration file loading. The default configuration path is
//! `~/.config/tftpvault/config.toml`; every section and field has a default,
//! so an absent or empty file yields a runnable configuration serving the
//! current directory.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("port must not be 0")]
    InvalidPort,

    #[error("timeout_secs must be between 1 and 3600 seconds, got {0}")]
    InvalidTimeout(u64),

    #[error("root must not be empty")]
    EmptyRoot,

    #[error("log_level must be one of: trace, debug, info, warn, error; got {0}")]
    InvalidLogLevel(String),
}

/// Valid log level values for tracing configuration.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Main configuration structure for the tftpvault daemon.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    /// General daemon configuration.
    pub daemon: DaemonConfig,

    /// Listener configuration.
    pub server: ServerConfig,

    /// File store configuration.
    pub store: StoreConfig,
}

/// General daemon configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DaemonConfig {
    /// Logging level (trace, debug, info, warn, error).
    pub log_level: String,
}

/// UDP listener configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// Host address to bind.
    pub host: String,

    /// Port number to bind. TFTP's well-known port is 69.
    pub port: u16,

    /// Per-transfer retransmission timeout in seconds.
    pub timeout_secs: u64,
}

/// File store configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StoreConfig {
    /// Directory served as the trusted root. Every request is confined to
    /// this directory; it is resolved to an absolute, symlink-free path at
    /// startup.
    pub root: PathBuf,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 69,
            timeout_secs: 5,
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
        }
    }
}

/// Returns the default configuration file path.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tftpvault")
        .join("config.toml")
}

impl Config {
    /// Apply environment variable overrides to the configuration.
    ///
    /// Environment variables take precedence over config file values.
    /// Supported variables:
    /// - TFTPVAULT_ROOT: Override the served directory
    /// - TFTPVAULT_LOG_LEVEL: Override log level (trace, debug, info, warn, error)
    pub fn apply_env_overrides(&mut self) {
        if let Ok(root) = std::env::var("TFTPVAULT_ROOT") {
            if !root.is_empty() {
                tracing::info!("Overriding root from environment: {}", root);
                self.store.root = PathBuf::from(root);
            }
        }

        if let Ok(level) = std::env::var("TFTPVAULT_LOG_LEVEL") {
            if !level.is_empty() {
                tracing::info!("Overriding log_level from environment: {}", level);
                self.daemon.log_level = level;
            }
        }
    }

    /// Validate the configuration values.
    ///
    /// Returns an error if any configuration value is outside the valid
    /// range. Whether the root actually exists is checked later, when the
    /// resolver is constructed.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::InvalidPort);
        }

        if self.server.timeout_secs < 1 || self.server.timeout_secs > 3600 {
            return Err(ConfigError::InvalidTimeout(self.server.timeout_secs));
        }

        if self.store.root.as_os_str().is_empty() {
            return Err(ConfigError::EmptyRoot);
        }

        let level = self.daemon.log_level.to_lowercase();
        if !VALID_LOG_LEVELS.contains(&level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(self.daemon.log_level.clone()));
        }

        Ok(())
    }

    /// Load configuration from a file.
    ///
    /// If the file does not exist, returns the default configuration.
    /// If the file exists but is invalid TOML, returns an error.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_toml(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Load configuration from the default path.
    pub fn load_default() -> Result<Self> {
        Self::load(default_config_path())
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str).map_err(|e| anyhow::anyhow!("Invalid TOML configuration: {e}"))
    }
}
