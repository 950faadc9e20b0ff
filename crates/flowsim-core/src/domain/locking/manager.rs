//! Lock manager for coordinating keyed locks
//!
//! The lock manager provides file-based mutual exclusion keyed by arbitrary
//! strings. It handles:
//! - Atomic cross-process acquisition (hard-link into place, fails if held)
//! - Bounded waiting with a fixed retry interval
//! - Stale lock detection and token-checked takeover
//! - Renewal of held locks while the guard lives
//! - In-memory tracking of locks held by this process

use super::file;
use super::guard::LockGuard;
use super::types::{LockConfig, LockError, LockInfo, LockResult, LockStatus, is_process_alive};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock, mpsc};
use tokio::time::{Instant, sleep};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Keys longer than this are stored under a hashed file name
const MAX_PLAIN_NAME_LEN: usize = 100;

/// Readable prefix kept in hashed file names
const HASHED_NAME_PREFIX_LEN: usize = 48;

/// How long a holder's liveness answer is trusted while waiting
const LIVENESS_RECHECK: Duration = Duration::from_secs(1);

/// How many times force release waits out a busy maintenance marker
const FORCE_RELEASE_ATTEMPTS: u32 = 200;

/// Outcome of a single acquisition attempt
enum Attempt {
    Acquired(LockGuard),
    Held(LockInfo),
    Stale(LockInfo),
    Vanished,
}

/// Holder liveness answers, reused across the retries of one acquisition
struct LivenessCache {
    check: fn(u32) -> bool,
    checked: HashMap<Uuid, (bool, Instant)>,
}

impl LivenessCache {
    fn new() -> Self {
        Self::with_check(is_process_alive)
    }

    fn with_check(check: fn(u32) -> bool) -> Self {
        Self {
            check,
            checked: HashMap::new(),
        }
    }

    fn is_stale(&mut self, info: &LockInfo) -> bool {
        let check = self.check;
        let checked = &mut self.checked;
        info.is_stale_with(|pid| {
            if let Some((alive, at)) = checked.get(&info.id) {
                if at.elapsed() < LIVENESS_RECHECK {
                    return *alive;
                }
            }
            let alive = check(pid);
            checked.insert(info.id, (alive, Instant::now()));
            alive
        })
    }
}

/// Lock manager for coordinating keyed locks
#[derive(Debug, Clone)]
pub struct LockManager {
    /// Configuration
    config: LockConfig,

    /// Locks held by guards of this manager (lock_key -> LockInfo)
    active_locks: Arc<RwLock<HashMap<String, LockInfo>>>,

    /// Channel receiver for lock release notifications
    release_rx: Arc<Mutex<mpsc::UnboundedReceiver<Uuid>>>,

    /// Channel sender for lock release notifications
    release_tx: mpsc::UnboundedSender<Uuid>,
}

impl LockManager {
    /// Create a new lock manager with the given configuration
    pub fn new(config: LockConfig) -> Self {
        let (release_tx, release_rx) = mpsc::unbounded_channel();

        Self {
            config,
            active_locks: Arc::new(RwLock::new(HashMap::new())),
            release_rx: Arc::new(Mutex::new(release_rx)),
            release_tx,
        }
    }

    /// Create a lock manager with a custom lock directory
    pub fn with_lock_dir(dir: impl Into<PathBuf>) -> Self {
        Self::new(LockConfig::default().with_lock_dir(dir))
    }

    /// Get the configuration
    pub fn config(&self) -> &LockConfig {
        &self.config
    }

    /// Initialize the lock manager (create lock directory if needed)
    pub async fn initialize(&self) -> LockResult<()> {
        if !self.config.lock_dir.exists() {
            std::fs::create_dir_all(&self.config.lock_dir).map_err(|e| {
                LockError::IoError(format!(
                    "Failed to create lock directory {}: {}",
                    self.config.lock_dir.display(),
                    e
                ))
            })?;
        }

        if self.config.auto_cleanup_stale {
            self.cleanup_stale_locks().await?;
        }

        Ok(())
    }

    /// Acquire the lock for `lock_key`, waiting at most `timeout`
    ///
    /// `None` uses the configured default timeout. Fails with
    /// [`LockError::Timeout`] when the lock stays held for the whole wait.
    /// The returned guard renews the lock until it is released.
    pub async fn acquire_lock(
        &self,
        lock_key: &str,
        holder_description: &str,
        timeout: Option<Duration>,
    ) -> LockResult<LockGuard> {
        let timeout = timeout.unwrap_or(self.config.default_timeout);
        let lock_file = self.lock_file_path(lock_key);
        let mut liveness = LivenessCache::new();
        self.process_releases().await;

        debug!(
            lock_key = %lock_key,
            timeout_ms = timeout.as_millis(),
            "Attempting to acquire lock"
        );

        let start = Instant::now();
        let mut last_holder = String::from("unknown");

        loop {
            match self
                .try_acquire_internal(lock_key, &lock_file, holder_description, &mut liveness)
                .await?
            {
                Attempt::Acquired(guard) => {
                    info!(
                        lock_key = %lock_key,
                        elapsed_ms = start.elapsed().as_millis(),
                        "Lock acquired"
                    );
                    return Ok(guard);
                }
                Attempt::Stale(existing) => {
                    last_holder = existing.holder_label();
                    if file::remove_if_stale(&lock_file, Some(existing.id))? == Some(true) {
                        warn!(
                            lock_key = %lock_key,
                            holder = %last_holder,
                            "Took over stale lock"
                        );
                        // Stale takeover does not count against the timeout
                        continue;
                    }
                }
                Attempt::Held(existing) => last_holder = existing.holder_label(),
                Attempt::Vanished => {}
            }

            let elapsed = start.elapsed();
            if elapsed >= timeout {
                debug!(lock_key = %lock_key, holder = %last_holder, "Lock acquisition timed out");
                return Err(LockError::Timeout {
                    resource: lock_key.to_string(),
                    holder: last_holder,
                });
            }
            sleep(self.config.retry_interval.min(timeout - elapsed)).await;
        }
    }

    /// Try to acquire a lock without waiting
    pub async fn try_acquire_lock(
        &self,
        lock_key: &str,
        holder_description: &str,
    ) -> LockResult<LockGuard> {
        self.process_releases().await;
        let lock_file = self.lock_file_path(lock_key);
        let mut liveness = LivenessCache::new();
        match self
            .try_acquire_internal(lock_key, &lock_file, holder_description, &mut liveness)
            .await?
        {
            Attempt::Acquired(guard) => Ok(guard),
            Attempt::Held(existing) => Err(LockError::Contention {
                resource: lock_key.to_string(),
                holder: existing.holder_label(),
            }),
            Attempt::Stale(existing) => Err(LockError::StaleLock {
                resource: lock_key.to_string(),
                holder_pid: existing.holder_pid,
            }),
            Attempt::Vanished => Err(LockError::Contention {
                resource: lock_key.to_string(),
                holder: "unknown".to_string(),
            }),
        }
    }

    /// Single acquisition attempt
    ///
    /// The lock info is written to a private temp file and hard-linked to
    /// the lock path; linking fails if the path exists, so at most one
    /// holder wins and the winner's file is never observed half-written.
    async fn try_acquire_internal(
        &self,
        lock_key: &str,
        lock_file: &Path,
        holder_description: &str,
        liveness: &mut LivenessCache,
    ) -> LockResult<Attempt> {
        if let Some(parent) = lock_file.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    LockError::IoError(format!("Failed to create lock directory: {}", e))
                })?;
            }
        }

        let lock_info = LockInfo::new(
            lock_key.to_string(),
            holder_description.to_string(),
            Some(self.config.default_ttl),
        );

        if file::link_new(lock_file, &lock_info)? {
            let mut active = self.active_locks.write().await;
            active.insert(lock_key.to_string(), lock_info.clone());
            let mut guard =
                LockGuard::new(lock_info, lock_file.to_path_buf(), self.release_tx.clone());
            guard.start_heartbeat(self.config.default_ttl);
            return Ok(Attempt::Acquired(guard));
        }

        match file::read_info(lock_file) {
            Ok(existing) if liveness.is_stale(&existing) => Ok(Attempt::Stale(existing)),
            Ok(existing) => Ok(Attempt::Held(existing)),
            Err(LockError::NotFound(_)) => Ok(Attempt::Vanished),
            Err(LockError::Corrupted(reason)) => {
                if file::remove_if_stale(lock_file, None)? == Some(true) {
                    warn!(lock_key = %lock_key, reason = %reason, "Removed corrupted lock file");
                }
                Ok(Attempt::Vanished)
            }
            Err(e) => Err(e),
        }
    }

    /// Force release a lock by key (for operator cleanup)
    pub async fn force_release_lock(&self, lock_key: &str) -> LockResult<()> {
        let mut active = self.active_locks.write().await;
        active.remove(lock_key);

        let lock_file = self.lock_file_path(lock_key);
        let removed =
            file::with_maintenance_retry(&lock_file, FORCE_RELEASE_ATTEMPTS, || {
                file::remove(&lock_file)
            })?;
        if removed.is_none() {
            warn!(lock_key = %lock_key, "Lock file busy, removing without maintenance marker");
            file::remove(&lock_file)?;
        }

        info!(lock_key = %lock_key, "Lock force-released");
        Ok(())
    }

    /// Check the status of a lock
    pub async fn check_lock_status(&self, lock_key: &str) -> LockResult<LockStatus> {
        self.process_releases().await;
        let lock_file = self.lock_file_path(lock_key);

        let info = match file::read_info(&lock_file) {
            Ok(info) => info,
            Err(LockError::NotFound(_)) => return Ok(LockStatus::Available),
            Err(LockError::Corrupted(_)) => return Ok(LockStatus::Stale),
            Err(e) => return Err(e),
        };

        let active = self.active_locks.read().await;
        if active.get(lock_key).map(|held| held.id == info.id).unwrap_or(false) {
            Ok(LockStatus::HeldBySelf)
        } else if info.is_stale() {
            Ok(LockStatus::Stale)
        } else {
            Ok(LockStatus::HeldByOther)
        }
    }

    /// Get information about a lock, if one is on disk
    pub async fn get_lock_info(&self, lock_key: &str) -> LockResult<Option<LockInfo>> {
        match file::read_info(&self.lock_file_path(lock_key)) {
            Ok(info) => Ok(Some(info)),
            Err(LockError::NotFound(_)) | Err(LockError::Corrupted(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// List locks currently held by this manager
    pub async fn list_active_locks(&self) -> Vec<LockInfo> {
        self.process_releases().await;
        let active = self.active_locks.read().await;
        active.values().cloned().collect()
    }

    /// List every lock file in the lock directory
    pub async fn list_lock_files(&self) -> LockResult<Vec<LockInfo>> {
        let mut locks = Vec::new();
        for path in self.lock_file_paths()? {
            if let Ok(info) = file::read_info(&path) {
                locks.push(info);
            }
        }
        locks.sort_by(|a, b| a.lock_key.cmp(&b.lock_key));
        Ok(locks)
    }

    /// Remove stale and corrupted lock files
    ///
    /// Files whose maintenance marker is busy are skipped and counted on a
    /// later run.
    pub async fn cleanup_stale_locks(&self) -> LockResult<u32> {
        let mut cleaned = 0;

        for path in self.lock_file_paths()? {
            match file::read_info(&path) {
                Ok(info) if info.is_stale() => {
                    if file::remove_if_stale(&path, Some(info.id))? == Some(true) {
                        self.active_locks.write().await.remove(&info.lock_key);
                        info!(lock_key = %info.lock_key, "Cleaned up stale lock");
                        cleaned += 1;
                    }
                }
                Ok(_) | Err(LockError::NotFound(_)) => {}
                Err(LockError::Corrupted(_)) => {
                    if file::remove_if_stale(&path, None)? == Some(true) {
                        info!(path = %path.display(), "Cleaned up corrupted lock file");
                        cleaned += 1;
                    }
                }
                Err(e) => return Err(e),
            }
        }

        Ok(cleaned)
    }

    /// Process pending release notifications from guards
    pub async fn process_releases(&self) {
        let mut rx = self.release_rx.lock().await;
        let mut released = Vec::new();
        while let Ok(lock_id) = rx.try_recv() {
            released.push(lock_id);
        }
        drop(rx);

        if !released.is_empty() {
            let mut active = self.active_locks.write().await;
            active.retain(|_, info| !released.contains(&info.id));
        }
    }

    // ========== Internal Methods ==========

    /// Get the path to a lock file
    pub(crate) fn lock_file_path(&self, lock_key: &str) -> PathBuf {
        self.config
            .lock_dir
            .join(format!("{}.lock", lock_file_name(lock_key)))
    }

    fn lock_file_paths(&self) -> LockResult<Vec<PathBuf>> {
        let entries = match std::fs::read_dir(&self.config.lock_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(LockError::IoError(format!(
                    "Failed to read lock directory: {}",
                    e
                )));
            }
        };

        Ok(entries
            .flatten()
            .map(|entry| entry.path())
            .filter(|path| path.extension().map(|e| e == "lock").unwrap_or(false))
            .collect())
    }
}

/// File name (without extension) for a lock key
///
/// Short keys made of `[A-Za-z0-9._-]` map to themselves. Anything else
/// keeps a sanitized prefix and gets a SHA-256 suffix after a `+`, a
/// character plain names never contain, so distinct keys get distinct files.
fn lock_file_name(lock_key: &str) -> String {
    let sanitized: String = lock_key
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();

    let plain = sanitized == lock_key
        && !sanitized.is_empty()
        && !sanitized.starts_with('.')
        && sanitized.len() <= MAX_PLAIN_NAME_LEN;
    if plain {
        return sanitized;
    }

    let digest = hex::encode(Sha256::digest(lock_key.as_bytes()));
    let prefix: String = sanitized.chars().take(HASHED_NAME_PREFIX_LEN).collect();
    format!("{}+{}", prefix, &digest[..16])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    fn test_config(lock_dir: PathBuf) -> LockConfig {
        LockConfig::default()
            .with_lock_dir(lock_dir)
            .with_retry_interval(Duration::from_millis(5))
    }

    async fn create_test_manager() -> (LockManager, TempDir) {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let manager = LockManager::new(test_config(temp_dir.path().join("locks")));
        manager.initialize().await.expect("Failed to initialize");
        (manager, temp_dir)
    }

    fn expired_lock(key: &str) -> LockInfo {
        let mut info = LockInfo::new(key.to_string(), "crashed".to_string(), None);
        info.expires_at = Some(chrono::Utc::now() - chrono::Duration::seconds(1));
        info
    }

    #[tokio::test]
    async fn test_acquire_and_release_lock() {
        let (manager, _temp) = create_test_manager().await;
        let key = "flow-1-create-webhook-simulation";

        let guard = manager
            .acquire_lock(key, "test", None)
            .await
            .expect("Failed to acquire lock");

        assert_eq!(guard.lock_key(), key);
        assert!(guard.is_valid());
        assert_eq!(
            manager.check_lock_status(key).await.unwrap(),
            LockStatus::HeldBySelf
        );

        guard.release().expect("Failed to release");

        assert_eq!(
            manager.check_lock_status(key).await.unwrap(),
            LockStatus::Available
        );
        assert!(manager.list_active_locks().await.is_empty());
    }

    #[tokio::test]
    async fn test_same_key_is_not_reentrant() {
        let (manager, _temp) = create_test_manager().await;
        let key = "flow-1-create-webhook-simulation";

        let _guard = manager.acquire_lock(key, "first", None).await.unwrap();

        let err = manager
            .acquire_lock(key, "second", Some(Duration::from_millis(50)))
            .await
            .unwrap_err();

        match err {
            LockError::Timeout { resource, holder } => {
                assert_eq!(resource, key);
                assert!(holder.starts_with("first@"));
            }
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_distinct_keys_do_not_collide() {
        let (manager, _temp) = create_test_manager().await;

        let create = manager
            .acquire_lock("flow-1-create-webhook-simulation", "test", None)
            .await
            .unwrap();
        let delete = manager
            .acquire_lock("flow-1-delete-webhook-simulation", "test", None)
            .await
            .unwrap();

        assert_ne!(create.id(), delete.id());
        assert_eq!(manager.list_active_locks().await.len(), 2);
    }

    #[tokio::test]
    async fn test_waiter_acquires_after_release() {
        let (manager, _temp) = create_test_manager().await;
        let key = "flow-2-delete-webhook-simulation";

        let guard = manager.acquire_lock(key, "holder", None).await.unwrap();

        let waiter = manager.clone();
        let handle = tokio::spawn(async move {
            waiter
                .acquire_lock(key, "waiter", Some(Duration::from_secs(2)))
                .await
        });

        tokio::time::sleep(Duration::from_millis(30)).await;
        guard.release().unwrap();

        let second = handle.await.expect("task panicked").expect("waiter should acquire");
        assert_eq!(second.info().holder_description, "waiter");
    }

    #[tokio::test]
    async fn test_dropped_guard_frees_lock() {
        let (manager, _temp) = create_test_manager().await;
        let key = "flow-3-create-webhook-simulation";

        {
            let _guard = manager.acquire_lock(key, "test", None).await.unwrap();
        }

        let again = manager
            .try_acquire_lock(key, "test")
            .await
            .expect("lock should be free after drop");
        assert!(again.is_valid());
        assert_eq!(manager.list_active_locks().await.len(), 1);
    }

    #[tokio::test]
    async fn test_try_acquire_reports_contention() {
        let (manager, _temp) = create_test_manager().await;
        let key = "flow-4-create-webhook-simulation";

        let _guard = manager.acquire_lock(key, "test", None).await.unwrap();
        let err = manager.try_acquire_lock(key, "other").await.unwrap_err();
        assert!(matches!(err, LockError::Contention { .. }));
    }

    #[tokio::test]
    async fn test_stale_lock_is_taken_over() {
        let (manager, _temp) = create_test_manager().await;
        let key = "flow-5-create-webhook-simulation";

        let mut stale = LockInfo::new(key.to_string(), "crashed".to_string(), None);
        stale.holder_pid = 999_999_999;
        file::link_new(&manager.lock_file_path(key), &stale).unwrap();

        assert_eq!(manager.check_lock_status(key).await.unwrap(), LockStatus::Stale);

        let guard = manager
            .acquire_lock(key, "test", Some(Duration::from_millis(100)))
            .await
            .expect("stale lock should be taken over");
        assert_ne!(guard.id(), stale.id);
    }

    #[tokio::test]
    async fn test_foreign_live_lock_is_held_by_other() {
        let (manager, _temp) = create_test_manager().await;
        let key = "flow-6-delete-webhook-simulation";

        let mut foreign = LockInfo::new(key.to_string(), "remote".to_string(), None);
        foreign.holder_host = "some-other-host.invalid".to_string();
        file::link_new(&manager.lock_file_path(key), &foreign).unwrap();

        assert_eq!(
            manager.check_lock_status(key).await.unwrap(),
            LockStatus::HeldByOther
        );
        let info = manager.get_lock_info(key).await.unwrap().unwrap();
        assert_eq!(info.id, foreign.id);
    }

    #[tokio::test]
    async fn test_cleanup_stale_locks() {
        let (manager, _temp) = create_test_manager().await;

        file::link_new(&manager.lock_file_path("a"), &expired_lock("a")).unwrap();
        std::fs::write(manager.lock_file_path("b"), "not json").unwrap();
        let _live = manager.acquire_lock("c", "live", None).await.unwrap();

        let cleaned = manager.cleanup_stale_locks().await.expect("Failed to cleanup");
        assert_eq!(cleaned, 2);

        let remaining = manager.list_lock_files().await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].lock_key, "c");
    }

    #[tokio::test]
    async fn test_force_release_lock() {
        let (manager, _temp) = create_test_manager().await;
        let key = "flow-7-create-webhook-simulation";

        let guard = manager.acquire_lock(key, "test", None).await.unwrap();
        manager.force_release_lock(key).await.unwrap();

        assert_eq!(manager.check_lock_status(key).await.unwrap(), LockStatus::Available);
        // Releasing the old guard afterwards is harmless
        guard.release().unwrap();
    }

    #[tokio::test]
    async fn test_held_lock_is_renewed_past_ttl() {
        let temp = TempDir::new().unwrap();
        let config = test_config(temp.path().join("locks")).with_ttl(Duration::from_millis(150));
        let holder = LockManager::new(config.clone());
        let rival = LockManager::new(config);
        let key = "flow-8-create-webhook-simulation";

        let guard = holder.acquire_lock(key, "slow", None).await.unwrap();
        tokio::time::sleep(Duration::from_millis(400)).await;

        assert_eq!(rival.check_lock_status(key).await.unwrap(), LockStatus::HeldByOther);
        let err = rival.try_acquire_lock(key, "rival").await.unwrap_err();
        assert!(matches!(err, LockError::Contention { .. }));

        guard.release().unwrap();
        rival.try_acquire_lock(key, "rival").await.expect("released lock should be free");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_stale_takeover_admits_one_holder_at_a_time() {
        let temp = TempDir::new().unwrap();
        let config = test_config(temp.path().join("locks"));
        let seed = LockManager::new(config.clone());
        seed.initialize().await.unwrap();
        let key = "flow-9-create-webhook-simulation";
        file::link_new(&seed.lock_file_path(key), &expired_lock(key)).unwrap();

        let current = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let mut handles = Vec::new();

        for i in 0..16 {
            let manager = LockManager::new(config.clone());
            let current = Arc::clone(&current);
            let peak = Arc::clone(&peak);
            handles.push(tokio::spawn(async move {
                let guard = manager
                    .acquire_lock(key, &format!("waiter-{i}"), Some(Duration::from_secs(10)))
                    .await?;
                let holders = current.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(holders, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                current.fetch_sub(1, Ordering::SeqCst);
                guard.release()
            }));
        }

        for handle in handles {
            handle.await.expect("task panicked").expect("waiter should acquire");
        }
        assert_eq!(peak.load(Ordering::SeqCst), 1);
        assert!(!seed.lock_file_path(key).exists());
    }

    #[tokio::test]
    async fn test_abandoned_maintenance_marker_does_not_block() {
        let (manager, _temp) = create_test_manager().await;
        let key = "flow-10-create-webhook-simulation";
        let lock_file = manager.lock_file_path(key);

        file::link_new(&lock_file, &expired_lock(key)).unwrap();
        file::link_new(&file::maintenance_path(&lock_file), &expired_lock("marker")).unwrap();

        let guard = manager
            .acquire_lock(key, "test", Some(Duration::from_millis(200)))
            .await
            .expect("abandoned marker should be cleared");
        assert!(guard.is_valid());
        assert!(!file::maintenance_path(&lock_file).exists());
    }

    static LIVENESS_CHECKS: AtomicUsize = AtomicUsize::new(0);

    fn counting_alive(_pid: u32) -> bool {
        LIVENESS_CHECKS.fetch_add(1, Ordering::SeqCst);
        true
    }

    #[test]
    fn test_liveness_checked_once_per_holder() {
        let mut cache = LivenessCache::with_check(counting_alive);
        let mut first = LockInfo::new("k".to_string(), "other".to_string(), None);
        first.holder_pid = 999_999_998;
        let mut second = first.clone();
        second.id = Uuid::new_v4();

        for _ in 0..10 {
            assert!(!cache.is_stale(&first));
        }
        assert_eq!(LIVENESS_CHECKS.load(Ordering::SeqCst), 1);

        assert!(!cache.is_stale(&second));
        assert_eq!(LIVENESS_CHECKS.load(Ordering::SeqCst), 2);

        // Own locks never need a check
        let own = LockInfo::new("k".to_string(), "self".to_string(), None);
        assert!(!cache.is_stale(&own));
        assert_eq!(LIVENESS_CHECKS.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_lock_file_path() {
        let manager = LockManager::with_lock_dir("/tmp/locks");
        let plain = manager.lock_file_path("flow-1-create-webhook-simulation");
        assert_eq!(
            plain,
            PathBuf::from("/tmp/locks/flow-1-create-webhook-simulation.lock")
        );

        let hashed = manager.lock_file_path("flow:abc/123");
        let name = hashed.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("flow_abc_123+"));
        assert!(name.ends_with(".lock"));
    }

    #[test]
    fn test_sanitized_keys_do_not_share_a_file() {
        let manager = LockManager::with_lock_dir("/tmp/locks");
        assert_ne!(manager.lock_file_path("a:b"), manager.lock_file_path("a_b"));
        assert_ne!(manager.lock_file_path("a/b"), manager.lock_file_path("a:b"));
    }

    #[tokio::test]
    async fn test_long_key_fits_file_name_limit() {
        let (manager, _temp) = create_test_manager().await;
        let long_key = format!("flow-{}-create-webhook-simulation", "x".repeat(1000));
        let other_long = format!("flow-{}-delete-webhook-simulation", "x".repeat(1000));

        let path = manager.lock_file_path(&long_key);
        assert!(path.file_name().unwrap().len() < 255);
        assert_ne!(path, manager.lock_file_path(&other_long));

        let guard = manager.acquire_lock(&long_key, "test", None).await.unwrap();
        assert!(path.exists());
        assert_eq!(manager.get_lock_info(&long_key).await.unwrap().unwrap().lock_key, long_key);
        guard.release().unwrap();
    }
}
