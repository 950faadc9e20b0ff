//! SQLite connection handling for the simulation store
//!
//! Opening a [`Database`] always brings the schema up to date, so callers
//! never see a pool without the `webhook_simulations` table.

use crate::storage::migrations;
use anyhow::{Context, Result};
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Default maximum connections in the pool
pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;

/// How long a connection waits on another process's write lock
const BUSY_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(5);

const MEMORY_PATH: &str = ":memory:";

/// Where and how to open the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    /// SQLite file, or `:memory:`
    pub path: PathBuf,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self::with_path(default_database_path())
    }
}

impl DatabaseConfig {
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
        }
    }

    /// A private in-memory store, gone when the pool closes
    pub fn in_memory() -> Self {
        Self {
            path: PathBuf::from(MEMORY_PATH),
            // Each connection would otherwise see its own empty database
            max_connections: 1,
        }
    }

    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    pub fn is_memory(&self) -> bool {
        self.path.as_os_str() == MEMORY_PATH
    }
}

/// `flowsim.db` under the platform config dir
pub fn default_database_path() -> PathBuf {
    dirs::config_dir()
        .map(|dir| dir.join("flowsim"))
        .unwrap_or_default()
        .join("flowsim.db")
}

/// Migrated SQLite pool holding simulation records
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
    path: PathBuf,
}

impl Database {
    /// Open (creating if needed) and migrate the store
    ///
    /// File stores use WAL so several flowsim processes can share one file.
    pub async fn open(config: DatabaseConfig) -> Result<Self> {
        let options = if config.is_memory() {
            SqliteConnectOptions::from_str("sqlite::memory:")?
        } else {
            if let Some(parent) = config.path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create database directory {}", parent.display())
                })?;
            }
            SqliteConnectOptions::new()
                .filename(&config.path)
                .create_if_missing(true)
                .journal_mode(SqliteJournalMode::Wal)
                .busy_timeout(BUSY_TIMEOUT)
        };

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await
            .with_context(|| format!("Failed to open database {}", config.path.display()))?;

        migrations::migrate(&pool)
            .await
            .with_context(|| format!("Failed to migrate database {}", config.path.display()))?;

        tracing::debug!(path = %config.path.display(), "Database opened");
        Ok(Self {
            pool,
            path: config.path,
        })
    }

    /// Open a fresh in-memory store
    pub async fn in_memory() -> Result<Self> {
        Self::open(DatabaseConfig::in_memory()).await
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Schema version recorded in the store
    pub async fn schema_version(&self) -> Result<i32> {
        migrations::schema_version(&self.pool).await
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}
