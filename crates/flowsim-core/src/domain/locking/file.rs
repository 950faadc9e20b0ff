//! Lock file primitives
//!
//! Lock bodies are only ever published whole: new locks are hard-linked
//! into place and renewals are renamed over the old body. Anything that
//! rewrites or removes an existing lock file (renewal, release, stale
//! takeover) first claims the key's maintenance marker, so the read that
//! decides the change and the change itself cannot interleave with
//! another process doing the same.

use super::types::{LockError, LockInfo, LockResult};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;
use uuid::Uuid;

/// How long a maintenance marker lives if its writer dies mid-operation
const MAINTENANCE_TTL: Duration = Duration::from_secs(5);

/// Outcome of a renewal attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Renewal {
    Renewed,
    /// The lock file is gone (released or removed by an operator)
    Released,
    /// Another holder's lock now sits at the path
    TakenOver,
}

/// Read lock info from a file
pub(crate) fn read_info(path: &Path) -> LockResult<LockInfo> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(LockError::NotFound(path.display().to_string()));
        }
        Err(e) => {
            return Err(LockError::IoError(format!(
                "Failed to read lock file {}: {}",
                path.display(),
                e
            )));
        }
    };

    serde_json::from_str(&contents)
        .map_err(|e| LockError::Corrupted(format!("Failed to parse {}: {}", path.display(), e)))
}

/// Publish `info` at `path` unless a file is already there
///
/// Returns `false` when the path is taken.
pub(crate) fn link_new(path: &Path, info: &LockInfo) -> LockResult<bool> {
    let staged = write_staged(path, info)?;
    let linked = std::fs::hard_link(&staged, path);
    let _ = std::fs::remove_file(&staged);

    match linked {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(false),
        Err(e) => Err(LockError::IoError(format!(
            "Failed to create lock file {}: {}",
            path.display(),
            e
        ))),
    }
}

/// Atomically replace the body at `path` with `info`
pub(crate) fn replace(path: &Path, info: &LockInfo) -> LockResult<()> {
    let staged = write_staged(path, info)?;
    std::fs::rename(&staged, path).map_err(|e| {
        let _ = std::fs::remove_file(&staged);
        LockError::IoError(format!("Failed to replace lock file {}: {}", path.display(), e))
    })
}

/// Remove a file; a missing file is not an error
pub(crate) fn remove(path: &Path) -> LockResult<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(LockError::IoError(format!(
            "Failed to remove lock file {}: {}",
            path.display(),
            e
        ))),
    }
}

fn write_staged(path: &Path, info: &LockInfo) -> LockResult<PathBuf> {
    let staged = path.with_extension(format!("{}.tmp", Uuid::new_v4()));
    let json = serde_json::to_string_pretty(info)
        .map_err(|e| LockError::IoError(format!("Failed to serialize lock info: {}", e)))?;
    std::fs::write(&staged, json)
        .map_err(|e| LockError::IoError(format!("Failed to write lock file: {}", e)))?;
    Ok(staged)
}

pub(crate) fn maintenance_path(lock_file: &Path) -> PathBuf {
    lock_file.with_extension("lock.maint")
}

/// Run `op` while holding the maintenance marker of `lock_file`
///
/// Returns `Ok(None)` without running `op` when another process holds the
/// marker. An abandoned marker (dead writer or past its TTL) is cleared so
/// the next call can proceed.
pub(crate) fn with_maintenance<T>(
    lock_file: &Path,
    op: impl FnOnce() -> LockResult<T>,
) -> LockResult<Option<T>> {
    let marker = maintenance_path(lock_file);
    let claim = LockInfo::new(
        marker.display().to_string(),
        "maintenance".to_string(),
        Some(MAINTENANCE_TTL),
    );

    if !link_new(&marker, &claim)? {
        match read_info(&marker) {
            Ok(existing) if existing.is_stale() => {
                warn!(path = %marker.display(), holder = %existing.holder_label(), "Clearing abandoned lock maintenance marker");
                remove(&marker)?;
            }
            Err(LockError::Corrupted(_)) => remove(&marker)?,
            Ok(_) | Err(LockError::NotFound(_)) => {}
            Err(e) => return Err(e),
        }
        return Ok(None);
    }

    let result = op();
    let cleared = remove(&marker);
    let value = result?;
    cleared?;
    Ok(Some(value))
}

/// [`with_maintenance`], retried while the marker is busy
pub(crate) fn with_maintenance_retry<T>(
    lock_file: &Path,
    attempts: u32,
    mut op: impl FnMut() -> LockResult<T>,
) -> LockResult<Option<T>> {
    for _ in 0..attempts {
        if let Some(value) = with_maintenance(lock_file, &mut op)? {
            return Ok(Some(value));
        }
        std::thread::sleep(Duration::from_millis(1));
    }
    Ok(None)
}

/// Push the expiry of the lock at `lock_file` forward if it still carries `id`
///
/// `Ok(None)` means the marker was busy and nothing was checked.
pub(crate) fn renew_if_owned(
    lock_file: &Path,
    id: Uuid,
    ttl: Duration,
) -> LockResult<Option<Renewal>> {
    with_maintenance(lock_file, || match read_info(lock_file) {
        Ok(mut current) if current.id == id => {
            current.renew(ttl);
            replace(lock_file, &current)?;
            Ok(Renewal::Renewed)
        }
        Ok(_) => Ok(Renewal::TakenOver),
        Err(LockError::NotFound(_)) => Ok(Renewal::Released),
        Err(e) => Err(e),
    })
}

/// Remove the lock at `lock_file` if it is still the stale lock `expected`
///
/// `expected = None` targets a corrupted file. Returns `Ok(None)` when the
/// marker was busy, otherwise whether the file was removed. A lock that was
/// renewed or replaced since it was judged stale is left alone.
pub(crate) fn remove_if_stale(
    lock_file: &Path,
    expected: Option<Uuid>,
) -> LockResult<Option<bool>> {
    with_maintenance(lock_file, || match (read_info(lock_file), expected) {
        (Ok(current), Some(id)) if current.id == id && current.is_stale() => {
            remove(lock_file).map(|_| true)
        }
        (Err(LockError::Corrupted(_)), None) => remove(lock_file).map(|_| true),
        (Ok(_), _) | (Err(LockError::NotFound(_)), _) | (Err(LockError::Corrupted(_)), _) => {
            Ok(false)
        }
        (Err(e), _) => Err(e),
    })
}
