//! Configuration management for tipgated.
//!
//! Loads settings from /etc/tipgate/config.toml or uses defaults.
//! The deconfliction provider is chosen here, once, at startup.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tipgate_common::ScoringWeights;
use tracing::{info, warn};

/// Config file path
pub const CONFIG_PATH: &str = "/etc/tipgate/config.toml";

/// Fallback config file path
pub const DEFAULT_CONFIG_PATH: &str = "/var/lib/tipgate/config.toml";

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Missing required config field: {0}")]
    MissingField(&'static str),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Daemon settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Default tracing filter when RUST_LOG is unset
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    Memory,
    #[default]
    Json,
}

/// Tip and audit storage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,

    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("/var/lib/tipgate")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            data_dir: default_data_dir(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// Canned answers for development and tests
    #[default]
    Stub,
    /// Inter-agency HTTP service
    Remote,
}

/// Deconfliction provider settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeconflictionConfig {
    #[serde(default)]
    pub provider: ProviderKind,

    /// Base URL of the remote service
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Bearer credential for the remote service
    #[serde(default)]
    pub api_key: Option<String>,

    /// Per-call timeout in seconds
    #[serde(default = "default_deconfliction_timeout")]
    pub timeout_secs: u64,
}

fn default_deconfliction_timeout() -> u64 {
    10
}

impl Default for DeconflictionConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::default(),
            endpoint: None,
            api_key: None,
            timeout_secs: default_deconfliction_timeout(),
        }
    }
}

impl DeconflictionConfig {
    /// Endpoint and credentials, or a loud error for the remote provider
    pub fn remote_settings(&self) -> Result<(&str, &str), ConfigError> {
        let endpoint = self
            .endpoint
            .as_deref()
            .filter(|e| !e.trim().is_empty())
            .ok_or(ConfigError::MissingField("deconfliction.endpoint"))?;
        let api_key = self
            .api_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .ok_or(ConfigError::MissingField("deconfliction.api_key"))?;
        Ok((endpoint, api_key))
    }
}

/// Full daemon configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub daemon: DaemonConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub deconfliction: DeconflictionConfig,

    #[serde(default)]
    pub scoring: ScoringWeights,
}

impl Config {
    /// Load config from the standard paths, or return defaults when none exist.
    ///
    /// A file that exists but does not parse or validate is an error.
    pub fn load() -> Result<Self, ConfigError> {
        for path in [CONFIG_PATH, DEFAULT_CONFIG_PATH] {
            if Path::new(path).exists() {
                return Self::load_from_path(path);
            }
        }
        warn!("Config not found, using defaults");
        let config = Config::default();
        config.validate()?;
        Ok(config)
    }

    /// Load config from specific path
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let config = Self::parse(&content)?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=120).contains(&self.deconfliction.timeout_secs) {
            return Err(ConfigError::Invalid(format!(
                "deconfliction.timeout_secs must be between 1 and 120, got {}",
                self.deconfliction.timeout_secs
            )));
        }
        if self.deconfliction.provider == ProviderKind::Remote {
            self.deconfliction.remote_settings()?;
        }
        self.scoring.validate().map_err(ConfigError::Invalid)?;
        Ok(())
    }

    pub fn tips_dir(&self) -> PathBuf {
        self.storage.data_dir.join("tips")
    }

    pub fn audit_path(&self) -> PathBuf {
        self.storage.data_dir.join("audit.jsonl")
    }
}
