//! Lock provider seam
//!
//! The lifecycle service only needs "give me an exclusive section for this
//! key, waiting at most this long". [`LockManager`] is the file-backed
//! implementation; other backends plug in by implementing [`LockProvider`].

use async_trait::async_trait;
use std::time::Duration;

use super::guard::HeldLock;
use super::manager::LockManager;
use super::types::LockResult;

/// Supplier of mutually exclusive, timeout-bounded critical sections
#[async_trait]
pub trait LockProvider: Send + Sync {
    /// Acquire the lock for `key`, failing with a timeout error after `timeout`
    async fn acquire(&self, key: &str, timeout: Duration) -> LockResult<Box<dyn HeldLock>>;
}

#[async_trait]
impl LockProvider for LockManager {
    async fn acquire(&self, key: &str, timeout: Duration) -> LockResult<Box<dyn HeldLock>> {
        let description = self.config().holder_description.clone();
        let guard = self.acquire_lock(key, &description, Some(timeout)).await?;
        Ok(Box::new(guard))
    }
}
