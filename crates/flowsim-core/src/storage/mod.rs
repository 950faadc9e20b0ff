//! Storage layer - SQLite
//!
//! Provides the connection pool and schema migrations backing the
//! simulation repository.
//!
//! # Usage
//!
//! ```ignore
//! use flowsim_core::storage::{Database, DatabaseConfig};
//!
//! // In-memory database for tests
//! let db = Database::in_memory().await?;
//!
//! // File-backed database
//! let db = Database::open(DatabaseConfig::with_path("/var/lib/flowsim/flowsim.db")).await?;
//! ```

pub mod database;
pub mod migrations;

// Re-export commonly used types
pub use database::{Database, DatabaseConfig, default_database_path};
pub use migrations::SCHEMA_VERSION;
