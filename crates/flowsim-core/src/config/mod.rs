//! Configuration management with file persistence

use crate::domain::locking::LockConfig;
use crate::storage::{DatabaseConfig, default_database_path};
use anyhow::{Context, anyhow};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable overriding the config directory
pub const CONFIG_DIR_ENV: &str = "FLOWSIM_CONFIG_DIR";

/// Flowsim configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub locking: LockingConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockingConfig {
    pub lock_dir: PathBuf,
    pub timeout_ms: u64,
    pub ttl_secs: u64,
    pub retry_interval_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub database_path: PathBuf,
    pub max_connections: u32,
}

impl Default for LockingConfig {
    fn default() -> Self {
        let defaults = LockConfig::default();
        Self {
            lock_dir: default_lock_dir(),
            timeout_ms: defaults.default_timeout.as_millis() as u64,
            ttl_secs: defaults.default_ttl.as_secs(),
            retry_interval_ms: defaults.retry_interval.as_millis() as u64,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            max_connections: crate::storage::database::DEFAULT_MAX_CONNECTIONS,
        }
    }
}

/// Default directory for lock files
pub fn default_lock_dir() -> PathBuf {
    match dirs::config_dir() {
        Some(dir) => dir.join("flowsim").join("locks"),
        None => PathBuf::from(".flowsim").join("locks"),
    }
}

impl LockingConfig {
    /// Build the runtime lock manager configuration
    pub fn to_lock_config(&self) -> LockConfig {
        LockConfig::default()
            .with_lock_dir(self.lock_dir.clone())
            .with_timeout(Duration::from_millis(self.timeout_ms))
            .with_ttl(Duration::from_secs(self.ttl_secs))
            .with_retry_interval(Duration::from_millis(self.retry_interval_ms))
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.timeout_ms == 0 {
            return Err(anyhow!("locking.timeout_ms must be greater than 0"));
        }
        if self.retry_interval_ms == 0 {
            return Err(anyhow!("locking.retry_interval_ms must be greater than 0"));
        }
        // A lock must not go stale while a waiter is still entitled to wait
        if self.ttl_secs.saturating_mul(1000) <= self.timeout_ms {
            return Err(anyhow!(
                "locking.ttl_secs ({}s) must exceed locking.timeout_ms ({}ms)",
                self.ttl_secs,
                self.timeout_ms
            ));
        }
        Ok(())
    }
}

impl StorageConfig {
    /// Build the runtime database configuration
    pub fn to_database_config(&self) -> DatabaseConfig {
        DatabaseConfig::with_path(self.database_path.clone()).max_connections(self.max_connections)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.max_connections == 0 {
            return Err(anyhow!("storage.max_connections must be greater than 0"));
        }
        Ok(())
    }
}

impl Config {
    /// Get the config directory path
    pub fn config_dir() -> anyhow::Result<PathBuf> {
        let dir = if let Ok(custom_dir) = env::var(CONFIG_DIR_ENV) {
            PathBuf::from(custom_dir)
        } else {
            dirs::config_dir()
                .ok_or_else(|| anyhow!("Could not determine config directory"))?
                .join("flowsim")
        };
        Ok(dir)
    }

    /// Get the config file path
    pub fn config_path() -> anyhow::Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Load configuration from file, or return defaults if it doesn't exist
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load configuration from a specific file
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Config::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self) -> anyhow::Result<()> {
        self.save_to(&Self::config_path()?)
    }

    /// Save configuration to a specific file
    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        self.validate()?;

        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create config directory: {}", dir.display()))?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        self.locking.validate()?;
        self.storage.validate()
    }

    /// Get a configuration value by key
    pub fn get(&self, key: &str) -> anyhow::Result<String> {
        match key {
            "locking.lock_dir" => Ok(self.locking.lock_dir.display().to_string()),
            "locking.timeout_ms" => Ok(self.locking.timeout_ms.to_string()),
            "locking.ttl_secs" => Ok(self.locking.ttl_secs.to_string()),
            "locking.retry_interval_ms" => Ok(self.locking.retry_interval_ms.to_string()),

            "storage.database_path" => Ok(self.storage.database_path.display().to_string()),
            "storage.max_connections" => Ok(self.storage.max_connections.to_string()),

            _ => Err(unknown_key(key)),
        }
    }

    /// Set a configuration value by key
    ///
    /// The whole config is re-validated, so a value that conflicts with
    /// another setting is rejected and leaves `self` unchanged.
    pub fn set(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        let mut updated = self.clone();
        match key {
            "locking.lock_dir" => {
                updated.locking.lock_dir = non_empty_path(key, value)?;
            }
            "locking.timeout_ms" => {
                updated.locking.timeout_ms = parse_number(key, value)?;
            }
            "locking.ttl_secs" => {
                updated.locking.ttl_secs = parse_number(key, value)?;
            }
            "locking.retry_interval_ms" => {
                updated.locking.retry_interval_ms = parse_number(key, value)?;
            }

            "storage.database_path" => {
                updated.storage.database_path = non_empty_path(key, value)?;
            }
            "storage.max_connections" => {
                updated.storage.max_connections = parse_number(key, value)?;
            }

            _ => return Err(unknown_key(key)),
        }

        updated.validate()?;
        *self = updated;
        Ok(())
    }

    /// List all configuration keys and their values
    pub fn list(&self) -> anyhow::Result<Vec<(String, String)>> {
        Self::keys()
            .iter()
            .map(|key| Ok((key.to_string(), self.get(key)?)))
            .collect()
    }

    /// All recognised configuration keys
    pub fn keys() -> &'static [&'static str] {
        &[
            "locking.lock_dir",
            "locking.timeout_ms",
            "locking.ttl_secs",
            "locking.retry_interval_ms",
            "storage.database_path",
            "storage.max_connections",
        ]
    }

    /// Reset configuration to defaults
    pub fn reset() -> anyhow::Result<()> {
        let path = Self::config_path()?;
        if path.exists() {
            fs::remove_file(&path)
                .with_context(|| format!("Failed to remove config file: {}", path.display()))?;
        }
        Ok(())
    }
}

fn unknown_key(key: &str) -> anyhow::Error {
    anyhow!(
        "Unknown configuration key: {}. Use `flowsim config list` to see available keys.",
        key
    )
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> anyhow::Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .trim()
        .parse()
        .with_context(|| format!("Invalid {} value: {}", key, value))
}

fn non_empty_path(key: &str, value: &str) -> anyhow::Result<PathBuf> {
    if value.trim().is_empty() {
        return Err(anyhow!("{} must not be empty", key));
    }
    Ok(PathBuf::from(value))
}
