//! Configuration loading and management
//!
//! Configuration is loaded from `~/.config/crosstalk/config.toml`.
//!
//! This module follows the XDG Base Directory Specification:
//! - Config: `$XDG_CONFIG_HOME/crosstalk/` (~/.config/crosstalk/)
//! - Data: `$XDG_DATA_HOME/crosstalk/` (~/.local/share/crosstalk/)
//! - State/Logs: `$XDG_STATE_HOME/crosstalk/` (~/.local/state/crosstalk/)
//!
//! The data directory holds the two registry documents and the message
//! database side by side.

use std::path::PathBuf;

use serde::Deserialize;

use crate::error::{Error, Result};

/// Returns a best-effort home directory path.
fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Returns XDG_CONFIG_HOME or ~/.config
fn xdg_config_home() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
}

/// Returns XDG_DATA_HOME or ~/.local/share
fn xdg_data_home() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/share"))
}

/// Returns XDG_STATE_HOME or ~/.local/state
fn xdg_state_home() -> PathBuf {
    std::env::var("XDG_STATE_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/state"))
}

/// Main configuration struct
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    /// Message retention settings
    #[serde(default)]
    pub retention: RetentionConfig,

    /// Discovery aggregator settings
    #[serde(default)]
    pub discovery: DiscoveryConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Message retention settings
#[derive(Debug, Deserialize)]
pub struct RetentionConfig {
    /// Messages older than this many days are pruned at store open
    #[serde(default = "default_horizon_days")]
    pub horizon_days: i64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            horizon_days: default_horizon_days(),
        }
    }
}

fn default_horizon_days() -> i64 {
    30
}

/// Discovery aggregator settings
#[derive(Debug, Deserialize, Default)]
pub struct DiscoveryConfig {
    /// When true, remote registrations found during discovery are copied
    /// into the local registry. Off by default: a probe should not mutate
    /// registration state.
    #[serde(default)]
    pub adopt_remote: bool,
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from the default path
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            tracing::debug!("No config file found at {:?}, using defaults", config_path);
            return Ok(Config::default());
        }

        Self::load_from(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &PathBuf) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config file {:?}: {}", path, e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;

        if config.retention.horizon_days <= 0 {
            return Err(Error::Config(
                "retention.horizon_days must be positive".to_string(),
            ));
        }

        Ok(config)
    }

    /// Returns the default config file path
    ///
    /// `$XDG_CONFIG_HOME/crosstalk/config.toml`
    pub fn config_path() -> PathBuf {
        xdg_config_home().join("crosstalk").join("config.toml")
    }

    /// Returns the data directory path (registries and message database)
    ///
    /// `$XDG_DATA_HOME/crosstalk/`
    pub fn data_dir() -> PathBuf {
        xdg_data_home().join("crosstalk")
    }

    /// Returns the state directory path (for logs)
    ///
    /// `$XDG_STATE_HOME/crosstalk/`
    pub fn state_dir() -> PathBuf {
        xdg_state_home().join("crosstalk")
    }

    /// Returns the local agent registry path
    pub fn registry_path() -> PathBuf {
        Self::data_dir().join("registry.json")
    }

    /// Returns the remote-host registry path
    pub fn hosts_path() -> PathBuf {
        Self::data_dir().join("ssh-registry.json")
    }

    /// Returns the message database path
    pub fn database_path() -> PathBuf {
        Self::data_dir().join("messages.db")
    }

    /// Path of the agent registry on a remote host, as the remote shell
    /// expands it. Remote probes read this file verbatim.
    pub fn remote_registry_path() -> &'static str {
        "~/.local/share/crosstalk/registry.json"
    }
}
