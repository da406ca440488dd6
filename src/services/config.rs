//! Configuration for the local deployment.
//!
//! Layered: built-in defaults, then `./.gitswarm/config.json`
//! (human-editable), then `GITSWARM__*` environment variables
//! (double underscore separates nesting levels).

use figment::providers::{Env, Format, Json, Serialized};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const STATE_DIR: &str = ".gitswarm";
pub const CONFIG_FILE: &str = "config.json";
pub const DATABASE_FILE: &str = "state.db";
pub const WORKTREE_DIR: &str = ".worktrees";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read configuration: {0}")]
    ReadError(#[from] figment::Error),
    #[error("Failed to write configuration: {0}")]
    WriteError(#[from] std::io::Error),
    #[error("Failed to serialize configuration: {0}")]
    SerializeError(#[from] serde_json::Error),
    #[error("Unknown configuration key: {0}")]
    UnknownKey(String),
    #[error("Validation failed for {field}: {reason}")]
    ValidationError { field: String, reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub repository: RepositoryConfig,
    pub database: DatabaseConfig,
    pub worktrees: WorktreeConfig,
    pub sync: SyncConfig,
    pub logging: LoggingConfig,
    pub rate_limits: RateLimitConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            repository: RepositoryConfig::default(),
            database: DatabaseConfig::default(),
            worktrees: WorktreeConfig::default(),
            sync: SyncConfig::default(),
            logging: LoggingConfig::default(),
            rate_limits: RateLimitConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepositoryConfig {
    /// Name of the repository registered by `init`.
    pub name: String,
    /// Path to the git repository root.
    pub path: String,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self { name: String::new(), path: ".".to_string() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { path: format!("{STATE_DIR}/{DATABASE_FILE}"), max_connections: 5 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorktreeConfig {
    pub root: String,
}

impl Default for WorktreeConfig {
    fn default() -> Self {
        Self { root: WORKTREE_DIR.to_string() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Off by default; the local deployment is self-contained.
    pub enabled: bool,
    pub server_url: String,
    /// Agent API key used for sync authentication.
    pub api_key: String,
    pub poll_interval_secs: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            server_url: String::new(),
            api_key: String::new(),
            poll_interval_secs: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// "pretty" or "json".
    pub format: String,
    pub file: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), format: "pretty".to_string(), file: None }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Base ceilings before the karma tier multiplier.
    pub base_max: u32,
    pub window_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self { base_max: 60, window_secs: 3600 }
    }
}

impl Config {
    /// Load from defaults, the state-dir file, and the environment.
    pub fn load(root: &Path) -> Result<Self, ConfigError> {
        let file = root.join(STATE_DIR).join(CONFIG_FILE);
        let config: Config = Figment::from(Serialized::defaults(Config::default()))
            .merge(Json::file(file))
            .merge(Env::prefixed("GITSWARM__").split("__"))
            .extract()?;
        config.validate()?;
        Ok(config)
    }

    pub fn config_path(root: &Path) -> PathBuf {
        root.join(STATE_DIR).join(CONFIG_FILE)
    }

    pub fn database_url(&self, root: &Path) -> String {
        format!("sqlite:{}", root.join(&self.database.path).to_string_lossy())
    }

    pub fn worktree_root(&self, root: &Path) -> PathBuf {
        root.join(&self.worktrees.root)
    }

    /// Persist the configuration, pretty-printed for hand editing.
    pub fn save(&self, root: &Path) -> Result<(), ConfigError> {
        let dir = root.join(STATE_DIR);
        std::fs::create_dir_all(&dir)?;
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(dir.join(CONFIG_FILE), json)?;
        Ok(())
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.sync.enabled && self.sync.server_url.is_empty() {
            return Err(ConfigError::ValidationError {
                field: "sync.server_url".to_string(),
                reason: "required when sync is enabled".to_string(),
            });
        }
        if self.rate_limits.window_secs == 0 {
            return Err(ConfigError::ValidationError {
                field: "rate_limits.window_secs".to_string(),
                reason: "must be positive".to_string(),
            });
        }
        match self.logging.format.as_str() {
            "pretty" | "json" => Ok(()),
            other => Err(ConfigError::ValidationError {
                field: "logging.format".to_string(),
                reason: format!("unknown format '{other}'"),
            }),
        }
    }

    /// Dotted-key lookup (`sync.server_url`) for `config <key>`.
    pub fn get_key(&self, key: &str) -> Result<serde_json::Value, ConfigError> {
        let value = serde_json::to_value(self)?;
        let pointer = format!("/{}", key.replace('.', "/"));
        value.pointer(&pointer).cloned().ok_or_else(|| ConfigError::UnknownKey(key.to_string()))
    }

    /// Dotted-key update for `config <key> <value>`. The value string
    /// parses as JSON when possible, else as a bare string.
    pub fn set_key(&mut self, key: &str, raw: &str) -> Result<(), ConfigError> {
        let mut value = serde_json::to_value(&*self)?;
        let pointer = format!("/{}", key.replace('.', "/"));
        let slot =
            value.pointer_mut(&pointer).ok_or_else(|| ConfigError::UnknownKey(key.to_string()))?;
        *slot = serde_json::from_str(raw)
            .unwrap_or_else(|_| serde_json::Value::String(raw.to_string()));

        let updated: Config = serde_json::from_value(value)?;
        updated.validate()?;
        *self = updated;
        Ok(())
    }
}
