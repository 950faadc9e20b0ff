//! Lock types and error definitions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// Default bound on lock acquisition
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_millis(1000);

/// Result type for lock operations
pub type LockResult<T> = std::result::Result<T, LockError>;

/// Lock errors
#[derive(Error, Debug, Clone)]
pub enum LockError {
    /// Lock acquisition timed out
    #[error("resource '{resource}' is held by {holder}")]
    Timeout { resource: String, holder: String },

    /// Lock is currently held by another holder
    #[error("Lock contention: resource '{resource}' is held by {holder}")]
    Contention { resource: String, holder: String },

    /// Lock was not found (for release operations)
    #[error("Lock not found: {0}")]
    NotFound(String),

    /// Lock is stale (holder process died or TTL passed)
    #[error("Stale lock detected: resource '{resource}' (holder pid {holder_pid})")]
    StaleLock { resource: String, holder_pid: u32 },

    /// I/O error during lock operations
    #[error("Lock I/O error: {0}")]
    IoError(String),

    /// Lock file corruption
    #[error("Lock file corrupted: {0}")]
    Corrupted(String),
}

impl LockError {
    /// Get error code for this lock error
    pub fn code(&self) -> &'static str {
        match self {
            Self::Timeout { .. } => "E300",
            Self::Contention { .. } => "E301",
            Self::NotFound(_) => "E302",
            Self::StaleLock { .. } => "E303",
            Self::IoError(_) => "E306",
            Self::Corrupted(_) => "E307",
        }
    }
}

/// Lock status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockStatus {
    /// Lock is available
    Available,
    /// Lock is held by a guard in this process
    HeldBySelf,
    /// Lock is held by another holder
    HeldByOther,
    /// Lock is stale (holder is dead or expired)
    Stale,
}

impl fmt::Display for LockStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Available => write!(f, "available"),
            Self::HeldBySelf => write!(f, "held_by_self"),
            Self::HeldByOther => write!(f, "held_by_other"),
            Self::Stale => write!(f, "stale"),
        }
    }
}

/// Information about a held lock, persisted as the lock file body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LockInfo {
    /// Holder token, unique per acquisition
    pub id: Uuid,

    /// Lock key as requested by the caller
    pub lock_key: String,

    /// Process ID of lock holder
    pub holder_pid: u32,

    /// Hostname of lock holder
    pub holder_host: String,

    /// Description of the lock holder (e.g., "simulation-service")
    pub holder_description: String,

    /// When the lock was acquired
    pub acquired_at: DateTime<Utc>,

    /// When the lock expires (None = no expiry)
    pub expires_at: Option<DateTime<Utc>>,

    /// Number of times the holder has renewed this lock
    #[serde(default)]
    pub renewal_count: u32,
}

impl LockInfo {
    /// Create a new lock info for the current process
    pub fn new(lock_key: String, holder_description: String, ttl: Option<Duration>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            lock_key,
            holder_pid: std::process::id(),
            holder_host: current_host(),
            holder_description,
            acquired_at: now,
            expires_at: ttl.map(|d| now + chrono::Duration::from_std(d).unwrap_or_default()),
            renewal_count: 0,
        }
    }

    /// Check if the lock is expired
    pub fn is_expired(&self) -> bool {
        self.expires_at
            .map(|exp| Utc::now() > exp)
            .unwrap_or(false)
    }

    /// Push the expiry `ttl` past now
    pub fn renew(&mut self, ttl: Duration) {
        self.expires_at = Some(Utc::now() + chrono::Duration::from_std(ttl).unwrap_or_default());
        self.renewal_count += 1;
    }

    /// Check if the lock can be taken over
    ///
    /// Liveness of the holder pid is only checked for other processes on
    /// this host; remote holders are judged by expiry alone.
    pub fn is_stale(&self) -> bool {
        self.is_stale_with(is_process_alive)
    }

    /// Staleness check with a caller-supplied liveness check for the holder pid
    ///
    /// `holder_alive` is only called when the answer depends on it.
    pub fn is_stale_with(&self, holder_alive: impl FnOnce(u32) -> bool) -> bool {
        if self.is_expired() {
            return true;
        }
        if self.holder_host != current_host() || self.holder_pid == std::process::id() {
            return false;
        }
        !holder_alive(self.holder_pid)
    }

    /// Human-readable holder label used in error messages
    pub fn holder_label(&self) -> String {
        format!(
            "{}@{} (pid {})",
            self.holder_description, self.holder_host, self.holder_pid
        )
    }
}

/// Configuration for the lock manager
#[derive(Debug, Clone)]
pub struct LockConfig {
    /// Base directory for lock files
    pub lock_dir: std::path::PathBuf,

    /// Default timeout for lock acquisition
    pub default_timeout: Duration,

    /// Default TTL for locks (how long before they expire)
    pub default_ttl: Duration,

    /// Whether to clean up stale locks on initialization
    pub auto_cleanup_stale: bool,

    /// Retry interval when waiting for a lock
    pub retry_interval: Duration,

    /// Holder description written into lock files
    pub holder_description: String,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            lock_dir: std::path::PathBuf::from(".flowsim/locks"),
            default_timeout: DEFAULT_LOCK_TIMEOUT,
            default_ttl: Duration::from_secs(30),
            auto_cleanup_stale: true,
            retry_interval: Duration::from_millis(25),
            holder_description: "simulation-service".to_string(),
        }
    }
}

impl LockConfig {
    /// Create a config with a custom lock directory
    pub fn with_lock_dir(mut self, dir: impl Into<std::path::PathBuf>) -> Self {
        self.lock_dir = dir.into();
        self
    }

    /// Set the default timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Set the default TTL
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    /// Set the retry interval
    pub fn with_retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = interval;
        self
    }

    /// Set the holder description
    pub fn with_holder_description(mut self, description: impl Into<String>) -> Self {
        self.holder_description = description.into();
        self
    }
}

fn current_host() -> String {
    gethostname::gethostname().to_string_lossy().into_owned()
}

/// Check if a process is still alive
pub(crate) fn is_process_alive(pid: u32) -> bool {
    #[cfg(unix)]
    {
        // kill with signal 0 only checks for existence
        use std::process::Command;
        Command::new("kill")
            .args(["-0", &pid.to_string()])
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    #[cfg(windows)]
    {
        use std::process::Command;
        Command::new("tasklist")
            .args(["/FI", &format!("PID eq {}", pid)])
            .output()
            .map(|o| String::from_utf8_lossy(&o.stdout).contains(&pid.to_string()))
            .unwrap_or(false)
    }

    #[cfg(not(any(unix, windows)))]
    {
        true
    }
}
