//! Keyed locking for concurrent transitions
//!
//! This module provides the lock primitive the simulation lifecycle
//! serializes on. Locks are keyed by arbitrary strings and shared across
//! processes through a common lock directory.
//!
//! # Architecture
//!
//! - **Provider**: `LockProvider`, the seam the lifecycle service depends on
//! - **Lock Manager**: `LockManager`, file-backed implementation
//! - **Guards**: `LockGuard`, released explicitly or on drop
//!
//! # Features
//!
//! - Atomic cross-process acquisition
//! - Bounded waits with a fixed retry interval
//! - Stale lock takeover (expired TTL or dead holder process), checked
//!   against the holder token under a per-key maintenance marker
//! - Heartbeat renewal while a guard is held
//! - No re-entrancy: every acquisition gets its own holder token
//!
//! # Example
//!
//! ```ignore
//! use flowsim_core::domain::locking::{LockConfig, LockManager};
//!
//! let manager = LockManager::new(LockConfig::default().with_lock_dir("/var/run/flowsim"));
//! manager.initialize().await?;
//!
//! let guard = manager.acquire_lock("flow-1-create-webhook-simulation", "worker", None).await?;
//! // critical section
//! guard.release()?;
//! ```

mod file;
pub mod guard;
pub mod manager;
pub mod provider;
pub mod types;

// Re-export main types
pub use guard::{HeldLock, LockGuard};
pub use manager::LockManager;
pub use provider::LockProvider;
pub use types::{LockConfig, LockError, LockInfo, LockResult, LockStatus, DEFAULT_LOCK_TIMEOUT};
