// ABOUTME: Configuration management for statepool
// Handles pool settings, per-session worker settings, and logging defaults

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Directory name used under the working directory and the home directory
const CONFIG_DIR_NAME: &str = ".statepool";

/// Top-level configuration for the state pool and the sessions it manages
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatePoolConfig {
    /// Key of the system model whose session is owned by the controller
    pub system_model: String,

    /// Settings applied to every session the pool creates
    pub session: SessionSettings,

    /// Logging configuration for the binary
    pub logging: LoggingConfig,
}

impl Default for StatePoolConfig {
    fn default() -> Self {
        Self {
            system_model: "controller".to_string(),
            session: SessionSettings::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Per-session settings used by the model session factory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    /// Background workers each session starts
    pub worker_names: Vec<String>,

    /// Interval between worker ticks
    #[serde(with = "duration_secs")]
    pub tick_interval: Duration,

    /// How long close waits for workers to stop before aborting them
    #[serde(with = "duration_secs")]
    pub close_timeout: Duration,

    /// Reject model keys that are not UUIDs
    pub require_uuid_keys: bool,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            worker_names: vec!["txn-watcher".to_string(), "presence".to_string()],
            tick_interval: Duration::from_secs(1),
            close_timeout: Duration::from_secs(5),
            require_uuid_keys: false,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset
    pub filter: String,

    /// Directory for JSONL log files (default: ~/.statepool/logs)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "statepool=info".to_string(),
            dir: None,
        }
    }
}

impl LoggingConfig {
    /// Resolve the log directory, falling back to the user config directory
    pub fn log_dir(&self) -> PathBuf {
        self.dir.clone().unwrap_or_else(|| {
            StatePoolConfig::user_config_dir()
                .unwrap_or_else(|_| PathBuf::from(CONFIG_DIR_NAME))
                .join("logs")
        })
    }
}

impl StatePoolConfig {
    /// Load configuration from a specific TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))?;

        Ok(config)
    }

    /// Load configuration from default locations
    ///
    /// The first existing file wins; defaults are used when none exists.
    pub fn load_default() -> Result<Self> {
        for path in Self::config_paths() {
            if path.exists() {
                return Self::load(&path);
            }
        }

        Ok(Self::default())
    }

    /// Save configuration as pretty TOML
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, content)
            .with_context(|| format!("Failed to write config to {}", path.display()))?;

        Ok(())
    }

    /// Get configuration file paths in order of precedence
    fn config_paths() -> Vec<PathBuf> {
        let mut paths = vec![];

        // 1. Local project config
        if let Ok(cwd) = std::env::current_dir() {
            paths.push(cwd.join(CONFIG_DIR_NAME).join("config.toml"));
        }

        // 2. User config (~/.statepool/config.toml)
        if let Ok(config_dir) = Self::user_config_dir() {
            paths.push(config_dir.join("config.toml"));
        }

        paths
    }

    /// Get the user configuration directory
    fn user_config_dir() -> Result<PathBuf> {
        let home_dir = dirs::home_dir().context("Could not determine home directory")?;
        Ok(home_dir.join(CONFIG_DIR_NAME))
    }
}

/// Serde helper for Duration as seconds (u64)
mod duration_secs {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
