//! Flowsim Core Library
//!
//! This crate provides the core functionality for flowsim, including:
//! - Webhook simulation lifecycle (create, get, delete) with one record per flow
//! - Keyed cross-process locking that serializes lifecycle transitions
//! - Storage (SQLite)
//! - Pre-transition hooks
//! - Configuration with file persistence

pub mod config;
pub mod domain;
pub mod error;
pub mod storage;


pub use error::{Error, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::domain::locking::{LockConfig, LockManager, LockProvider};
    pub use crate::domain::simulation::{
        FlowId, LoggingHooks, NoopHooks, ProjectId, SimulationHooks, SimulationRepository,
        SimulationResource, SimulationService,
    };
    pub use crate::error::{Error, Result};
    pub use crate::storage::{Database, DatabaseConfig};
}
