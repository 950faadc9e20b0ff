//! Lock guards for RAII-style lock management
//!
//! Guards release their lock when dropped, so a panicking or cancelled
//! critical section never leaves the lock file behind. Explicit
//! [`LockGuard::release`] is preferred because it reports failures.
//!
//! While a guard is held, a heartbeat task keeps renewing the lock file so
//! a critical section that outlives the TTL is not mistaken for a crashed
//! holder.

use super::file::{self, Renewal};
use super::types::{LockError, LockInfo, LockResult};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

/// Channel for notifying the lock manager when a guard is released
pub type ReleaseNotifier = mpsc::UnboundedSender<Uuid>;

/// How many times release waits out a busy maintenance marker
const RELEASE_ATTEMPTS: u32 = 200;

/// A lock held on behalf of a caller
///
/// This is the handle returned by a [`LockProvider`](super::LockProvider).
/// `release` must be called once; implementations also release on drop.
pub trait HeldLock: Send + Sync + fmt::Debug {
    /// The key this lock was acquired for
    fn key(&self) -> &str;

    /// Release the lock
    fn release(self: Box<Self>) -> LockResult<()>;
}

/// A file-backed lock guard
#[derive(Debug)]
pub struct LockGuard {
    /// Information about the held lock
    info: LockInfo,

    /// Path of the lock file carrying `info`
    lock_file: PathBuf,

    /// Channel to notify the lock manager of release
    release_tx: Option<ReleaseNotifier>,

    /// Renewal task, running until release
    heartbeat: Option<JoinHandle<()>>,

    /// Set by the heartbeat when another holder replaced our lock file
    lost: Arc<AtomicBool>,

    /// Whether the lock has been released
    released: bool,
}

impl LockGuard {
    /// Create a new lock guard
    pub(crate) fn new(info: LockInfo, lock_file: PathBuf, release_tx: ReleaseNotifier) -> Self {
        Self {
            info,
            lock_file,
            release_tx: Some(release_tx),
            heartbeat: None,
            lost: Arc::new(AtomicBool::new(false)),
            released: false,
        }
    }

    /// Start renewing the lock file every third of `ttl`
    ///
    /// Needs a tokio runtime; without one the lock simply expires after
    /// `ttl`.
    pub(crate) fn start_heartbeat(&mut self, ttl: Duration) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            debug!(lock_key = %self.info.lock_key, "No runtime, lock will not be renewed");
            return;
        };

        let lock_file = self.lock_file.clone();
        let lock_key = self.info.lock_key.clone();
        let id = self.info.id;
        let lost = Arc::clone(&self.lost);
        let interval = (ttl / 3).max(Duration::from_millis(1));

        self.heartbeat = Some(runtime.spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                match file::renew_if_owned(&lock_file, id, ttl) {
                    Ok(Some(Renewal::Renewed)) => {
                        debug!(lock_key = %lock_key, ttl_ms = ttl.as_millis(), "Lock renewed");
                    }
                    // Marker busy; the next beat retries
                    Ok(None) => {}
                    Ok(Some(Renewal::Released)) => break,
                    Ok(Some(Renewal::TakenOver)) => {
                        lost.store(true, Ordering::SeqCst);
                        warn!(lock_key = %lock_key, "Lock was taken over while held");
                        break;
                    }
                    Err(e) => {
                        warn!(lock_key = %lock_key, error = %e, "Failed to renew lock");
                    }
                }
            }
        }));
    }

    /// Get the holder token
    pub fn id(&self) -> Uuid {
        self.info.id
    }

    /// Get the lock key
    pub fn lock_key(&self) -> &str {
        &self.info.lock_key
    }

    /// Get the lock info as it was at acquisition
    pub fn info(&self) -> &LockInfo {
        &self.info
    }

    /// Get the lock file path
    pub fn lock_file(&self) -> &Path {
        &self.lock_file
    }

    /// Check if the lock is still ours
    ///
    /// False once released, once another holder has replaced the lock file,
    /// or when the unrenewed lock is past its TTL.
    pub fn is_valid(&self) -> bool {
        if self.released || self.lost.load(Ordering::SeqCst) {
            return false;
        }
        self.heartbeat.is_some() || !self.info.is_expired()
    }

    /// Explicitly release the lock
    pub fn release(mut self) -> LockResult<()> {
        self.do_release()
    }

    fn do_release(&mut self) -> LockResult<()> {
        if self.released {
            return Ok(());
        }
        self.released = true;

        if let Some(heartbeat) = self.heartbeat.take() {
            heartbeat.abort();
        }

        let result = remove_if_owned(&self.lock_file, self.info.id);
        if let Some(tx) = self.release_tx.take() {
            // Receiver gone means the manager was dropped; nothing to update
            let _ = tx.send(self.info.id);
        }
        debug!(lock_key = %self.info.lock_key, "Lock released");
        result
    }
}

impl HeldLock for LockGuard {
    fn key(&self) -> &str {
        self.lock_key()
    }

    fn release(self: Box<Self>) -> LockResult<()> {
        (*self).release()
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Err(e) = self.do_release() {
            warn!(lock_key = %self.info.lock_key, error = %e, "Failed to release dropped lock");
        }
    }
}

impl fmt::Display for LockGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Lock[{}]", self.info.lock_key)
    }
}

/// Remove the lock file if it still carries our holder token
///
/// A missing file or a file owned by someone else (after a stale takeover)
/// is not an error: the lock is no longer ours either way. If the
/// maintenance marker never frees up, the file is left to expire.
fn remove_if_owned(lock_file: &Path, id: Uuid) -> LockResult<()> {
    let outcome = file::with_maintenance_retry(lock_file, RELEASE_ATTEMPTS, || {
        match file::read_info(lock_file) {
            Ok(current) if current.id == id => file::remove(lock_file),
            Ok(current) => {
                warn!(
                    path = %lock_file.display(),
                    holder = %current.holder_label(),
                    "Lock was taken over before release"
                );
                Ok(())
            }
            Err(LockError::NotFound(_)) => Ok(()),
            Err(e) => Err(e),
        }
    })?;

    if outcome.is_none() {
        warn!(path = %lock_file.display(), "Lock file busy, leaving it to expire");
    }
    Ok(())
}
