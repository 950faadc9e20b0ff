//! Simulation lifecycle service
//!
//! Keeps at most one simulation per flow. `create` and `delete` each run
//! inside a lock scoped to `(flow, operation)`; `get` is a lock-free exact
//! match read.
//!
//! The two operations use separate lock keys. A `create` replacing an
//! existing record goes through the full `delete` path (and its lock), so
//! it is serialized against external deletes for that step only. An
//! external `delete` can still observe the gap between the internal
//! delete and the insert.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::entity::{FlowId, NewSimulation, ProjectId, SimulationResource};
use super::hooks::SimulationHooks;
use super::repository_trait::SimulationRepositoryTrait;
use crate::domain::locking::{LockProvider, DEFAULT_LOCK_TIMEOUT};
use crate::error::{Error, Result};

/// Class of transition a lock is taken for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockOperation {
    Create,
    Delete,
}

impl LockOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Delete => "delete",
        }
    }

    /// Lock key for this operation on a flow
    pub fn lock_key(&self, flow_id: &FlowId) -> String {
        format!("{}-{}-webhook-simulation", flow_id, self.as_str())
    }
}

impl fmt::Display for LockOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle manager for per-flow webhook simulations
#[derive(Clone)]
pub struct SimulationService {
    repository: Arc<dyn SimulationRepositoryTrait>,
    locks: Arc<dyn LockProvider>,
    hooks: Arc<dyn SimulationHooks>,
    lock_timeout: Duration,
}

impl fmt::Debug for SimulationService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimulationService")
            .field("lock_timeout", &self.lock_timeout)
            .finish_non_exhaustive()
    }
}

impl SimulationService {
    /// Create a new service over the given store, lock provider and hooks
    pub fn new(
        repository: Arc<dyn SimulationRepositoryTrait>,
        locks: Arc<dyn LockProvider>,
        hooks: Arc<dyn SimulationHooks>,
    ) -> Self {
        Self {
            repository,
            locks,
            hooks,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }

    /// Set the lock acquisition timeout
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    /// Get the lock acquisition timeout
    pub fn lock_timeout(&self) -> Duration {
        self.lock_timeout
    }

    /// Create the simulation for a flow, replacing any existing one
    pub async fn create(
        &self,
        flow_id: &FlowId,
        project_id: &ProjectId,
    ) -> Result<SimulationResource> {
        debug!(flow_id = %flow_id, project_id = %project_id, "Creating simulation");
        validate_ids(flow_id, project_id)?;

        self.with_lock(flow_id, LockOperation::Create, move || async move {
            if self.repository.exists_by_flow(flow_id).await? {
                // Replace under the existing record's own scope
                if let Some(existing) = self.repository.find_by_flow(flow_id).await? {
                    info!(
                        flow_id = %flow_id,
                        simulation_id = %existing.id,
                        "Replacing existing simulation"
                    );
                    self.delete(flow_id, &existing.project_id).await?;
                }
            }

            let simulation = NewSimulation::new(flow_id.clone(), project_id.clone());

            self.hooks.before_create(flow_id, project_id).await?;

            let created = self.repository.insert(&simulation).await?;
            info!(
                flow_id = %flow_id,
                project_id = %project_id,
                simulation_id = %created.id,
                "Simulation created"
            );
            Ok(created)
        })
        .await
    }

    /// Get the simulation matching both flow and project
    pub async fn get(
        &self,
        flow_id: &FlowId,
        project_id: &ProjectId,
    ) -> Result<SimulationResource> {
        debug!(flow_id = %flow_id, project_id = %project_id, "Getting simulation");

        match self.repository.find_one(flow_id, project_id).await? {
            Some(simulation) => Ok(simulation),
            None => {
                debug!(flow_id = %flow_id, project_id = %project_id, "Simulation not found");
                Err(Error::simulation_not_found(flow_id, project_id))
            }
        }
    }

    /// Delete the simulation matching both flow and project
    ///
    /// Deleting a simulation that does not exist is an error.
    pub async fn delete(&self, flow_id: &FlowId, project_id: &ProjectId) -> Result<()> {
        debug!(flow_id = %flow_id, project_id = %project_id, "Deleting simulation");
        validate_ids(flow_id, project_id)?;

        self.with_lock(flow_id, LockOperation::Delete, move || async move {
            let simulation = self.get(flow_id, project_id).await?;

            self.hooks.before_delete(flow_id, project_id).await?;

            self.repository.remove(simulation.id).await?;
            info!(
                flow_id = %flow_id,
                project_id = %project_id,
                simulation_id = %simulation.id,
                "Simulation deleted"
            );
            Ok(())
        })
        .await
    }

    /// Run `body` while holding the `(flow, operation)` lock
    ///
    /// The lock is released on every exit path. A failed release is logged
    /// and does not replace the body's result; dropping the held lock on
    /// panic or cancellation releases it as well.
    async fn with_lock<T, F, Fut>(
        &self,
        flow_id: &FlowId,
        operation: LockOperation,
        body: F,
    ) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let lock_key = operation.lock_key(flow_id);
        let lock = self.locks.acquire(&lock_key, self.lock_timeout).await?;

        let result = body().await;

        if let Err(e) = lock.release() {
            warn!(lock_key = %lock_key, error = %e, "Failed to release lock");
        }
        result
    }
}

fn validate_ids(flow_id: &FlowId, project_id: &ProjectId) -> Result<()> {
    flow_id.validate()?;
    project_id.validate()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::locking::{LockConfig, LockManager, LockStatus};
    use crate::domain::simulation::repository::SimulationRepository;
    use crate::storage::Database;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tempfile::TempDir;
    use uuid::Uuid;

    /// Hooks that record every call and can be told to fail
    #[derive(Default)]
    struct RecordingHooks {
        calls: Mutex<Vec<String>>,
        fail_create: bool,
        fail_delete: bool,
    }

    impl RecordingHooks {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl SimulationHooks for RecordingHooks {
        async fn before_create(&self, flow_id: &FlowId, _project_id: &ProjectId) -> Result<()> {
            self.calls.lock().unwrap().push(format!("before_create:{}", flow_id));
            if self.fail_create {
                return Err(Error::HookFailed("create rejected".to_string()));
            }
            Ok(())
        }

        async fn before_delete(&self, flow_id: &FlowId, _project_id: &ProjectId) -> Result<()> {
            self.calls.lock().unwrap().push(format!("before_delete:{}", flow_id));
            if self.fail_delete {
                return Err(Error::HookFailed("delete rejected".to_string()));
            }
            Ok(())
        }
    }

    /// Store wrapper that fails selected mutations
    struct FailingRepository {
        inner: SimulationRepository,
        fail_insert: bool,
        fail_remove: bool,
    }

    #[async_trait]
    impl SimulationRepositoryTrait for FailingRepository {
        async fn exists_by_flow(&self, flow_id: &FlowId) -> Result<bool> {
            self.inner.exists_by_flow(flow_id).await
        }

        async fn find_one(
            &self,
            flow_id: &FlowId,
            project_id: &ProjectId,
        ) -> Result<Option<SimulationResource>> {
            self.inner.find_one(flow_id, project_id).await
        }

        async fn find_by_flow(&self, flow_id: &FlowId) -> Result<Option<SimulationResource>> {
            self.inner.find_by_flow(flow_id).await
        }

        async fn insert(&self, simulation: &NewSimulation) -> Result<SimulationResource> {
            if self.fail_insert {
                return Err(Error::StoreFailed("insert refused".to_string()));
            }
            self.inner.insert(simulation).await
        }

        async fn remove(&self, id: Uuid) -> Result<()> {
            if self.fail_remove {
                return Err(Error::StoreFailed("remove refused".to_string()));
            }
            self.inner.remove(id).await
        }
    }

    struct Harness {
        service: SimulationService,
        repo: SimulationRepository,
        locks: LockManager,
        hooks: Arc<RecordingHooks>,
        _temp: TempDir,
    }

    async fn harness_with(
        hooks: RecordingHooks,
        fail_insert: bool,
        fail_remove: bool,
    ) -> Harness {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let db = Database::in_memory()
            .await
            .expect("Failed to create test database");
        let repo = SimulationRepository::new(db.pool().clone());
        let locks = LockManager::new(
            LockConfig::default()
                .with_lock_dir(temp.path().join("locks"))
                .with_retry_interval(Duration::from_millis(5)),
        );
        locks.initialize().await.expect("Failed to initialize locks");

        let hooks = Arc::new(hooks);
        let store = Arc::new(FailingRepository {
            inner: repo.clone(),
            fail_insert,
            fail_remove,
        });
        let service = SimulationService::new(store, Arc::new(locks.clone()), hooks.clone());

        Harness {
            service,
            repo,
            locks,
            hooks,
            _temp: temp,
        }
    }

    async fn harness() -> Harness {
        harness_with(RecordingHooks::default(), false, false).await
    }

    async fn assert_unlocked(h: &Harness, flow: &FlowId) {
        for op in [LockOperation::Create, LockOperation::Delete] {
            let status = h.locks.check_lock_status(&op.lock_key(flow)).await.unwrap();
            assert_eq!(status, LockStatus::Available, "{} lock leaked", op);
        }
    }

    #[test]
    fn test_lock_keys() {
        let flow = FlowId::new("flow-1");
        assert_eq!(
            LockOperation::Create.lock_key(&flow),
            "flow-1-create-webhook-simulation"
        );
        assert_eq!(
            LockOperation::Delete.lock_key(&flow),
            "flow-1-delete-webhook-simulation"
        );
    }

    #[tokio::test]
    async fn test_create_then_get() {
        let h = harness().await;
        let flow = FlowId::new("flow-1");
        let project = ProjectId::new("proj-1");

        let created = h.service.create(&flow, &project).await.unwrap();
        assert_eq!(created.flow_id, flow);
        assert_eq!(created.project_id, project);

        let fetched = h.service.get(&flow, &project).await.unwrap();
        assert_eq!(fetched.id, created.id);
        assert_eq!(h.hooks.calls(), vec!["before_create:flow-1"]);
        assert_unlocked(&h, &flow).await;
    }

    #[tokio::test]
    async fn test_create_replaces_existing() {
        let h = harness().await;
        let flow = FlowId::new("flow-1");

        let first = h.service.create(&flow, &"proj-1".into()).await.unwrap();
        let second = h.service.create(&flow, &"proj-1".into()).await.unwrap();

        assert_ne!(first.id, second.id);
        assert_eq!(h.repo.count_by_flow(&flow).await.unwrap(), 1);
        assert!(h.repo.get_by_id(first.id).await.unwrap().is_none());
        assert_eq!(
            h.hooks.calls(),
            vec![
                "before_create:flow-1",
                "before_delete:flow-1",
                "before_create:flow-1",
            ]
        );
    }

    #[tokio::test]
    async fn test_replace_with_new_project() {
        let h = harness().await;
        let flow = FlowId::new("flow-1");

        let first = h.service.create(&flow, &"proj-1".into()).await.unwrap();
        let second = h.service.create(&flow, &"proj-2".into()).await.unwrap();

        assert_ne!(first.id, second.id);
        assert_eq!(second.project_id.as_str(), "proj-2");
        assert_eq!(h.repo.count_by_flow(&flow).await.unwrap(), 1);
        assert!(h.service.get(&flow, &"proj-1".into()).await.unwrap_err().is_not_found());
        assert_eq!(h.service.get(&flow, &"proj-2".into()).await.unwrap().id, second.id);
        assert_unlocked(&h, &flow).await;
    }

    #[tokio::test]
    async fn test_delete_removes_record() {
        let h = harness().await;
        let flow = FlowId::new("flow-1");
        let project = ProjectId::new("proj-1");

        h.service.create(&flow, &project).await.unwrap();
        h.service.delete(&flow, &project).await.unwrap();

        assert!(!h.repo.exists_by_flow(&flow).await.unwrap());
        assert!(h.service.get(&flow, &project).await.unwrap_err().is_not_found());
        assert_unlocked(&h, &flow).await;
    }

    #[tokio::test]
    async fn test_delete_missing_is_not_found_without_hook() {
        let h = harness().await;
        let flow = FlowId::new("flow-404");

        let err = h.service.delete(&flow, &"proj-1".into()).await.unwrap_err();

        match err {
            Error::NotFound {
                entity_type,
                flow_id,
                project_id,
            } => {
                assert_eq!(entity_type, "webhookSimulation");
                assert_eq!(flow_id, "flow-404");
                assert_eq!(project_id, "proj-1");
            }
            other => panic!("expected NotFound, got {other:?}"),
        }
        assert!(h.hooks.calls().is_empty());
        assert_unlocked(&h, &flow).await;
    }

    #[tokio::test]
    async fn test_get_with_other_project_is_not_found() {
        let h = harness().await;
        let flow = FlowId::new("flow-1");

        h.service.create(&flow, &"proj-1".into()).await.unwrap();

        let err = h.service.get(&flow, &"proj-2".into()).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_before_create_failure_inserts_nothing() {
        let hooks = RecordingHooks {
            fail_create: true,
            ..Default::default()
        };
        let h = harness_with(hooks, false, false).await;
        let flow = FlowId::new("flow-1");

        let err = h.service.create(&flow, &"proj-1".into()).await.unwrap_err();
        assert!(matches!(err, Error::HookFailed(_)));
        assert!(!h.repo.exists_by_flow(&flow).await.unwrap());
        assert_unlocked(&h, &flow).await;
    }

    #[tokio::test]
    async fn test_before_create_failure_after_replace_leaves_nothing() {
        let h = harness().await;
        let flow = FlowId::new("flow-1");
        h.service.create(&flow, &"proj-1".into()).await.unwrap();

        let failing = harness_with(
            RecordingHooks {
                fail_create: true,
                ..Default::default()
            },
            false,
            false,
        )
        .await;
        let service = SimulationService::new(
            Arc::new(h.repo.clone()),
            Arc::new(failing.locks.clone()),
            failing.hooks.clone(),
        );

        let err = service.create(&flow, &"proj-1".into()).await.unwrap_err();
        assert!(matches!(err, Error::HookFailed(_)));
        // The prior record was removed by the replace step before the veto
        assert!(!h.repo.exists_by_flow(&flow).await.unwrap());
        assert_eq!(
            failing.hooks.calls(),
            vec!["before_delete:flow-1", "before_create:flow-1"]
        );
    }

    #[tokio::test]
    async fn test_before_delete_failure_keeps_record() {
        let hooks = RecordingHooks {
            fail_delete: true,
            ..Default::default()
        };
        let h = harness_with(hooks, false, false).await;
        let flow = FlowId::new("flow-1");
        let project = ProjectId::new("proj-1");

        let created = h.service.create(&flow, &project).await.unwrap();
        let err = h.service.delete(&flow, &project).await.unwrap_err();

        assert!(matches!(err, Error::HookFailed(_)));
        assert_eq!(h.service.get(&flow, &project).await.unwrap().id, created.id);
        assert_unlocked(&h, &flow).await;
    }

    #[tokio::test]
    async fn test_store_failures_release_locks() {
        let h = harness_with(RecordingHooks::default(), true, false).await;
        let flow = FlowId::new("flow-1");

        let err = h.service.create(&flow, &"proj-1".into()).await.unwrap_err();
        assert!(matches!(err, Error::StoreFailed(_)));
        assert_unlocked(&h, &flow).await;

        let h = harness_with(RecordingHooks::default(), false, true).await;
        h.repo
            .insert(&NewSimulation::new(flow.clone(), "proj-1".into()))
            .await
            .unwrap();

        let err = h.service.delete(&flow, &"proj-1".into()).await.unwrap_err();
        assert!(matches!(err, Error::StoreFailed(_)));
        // The hook already ran and is not undone
        assert_eq!(h.hooks.calls(), vec!["before_delete:flow-1"]);
        assert!(h.repo.exists_by_flow(&flow).await.unwrap());
        assert_unlocked(&h, &flow).await;
    }

    #[tokio::test]
    async fn test_lock_timeout_aborts_before_mutation() {
        let h = harness().await;
        let flow = FlowId::new("flow-1");
        let service = h.service.clone().with_lock_timeout(Duration::from_millis(50));

        let held = h
            .locks
            .acquire_lock(&LockOperation::Create.lock_key(&flow), "other-worker", None)
            .await
            .unwrap();

        let err = service.create(&flow, &"proj-1".into()).await.unwrap_err();
        assert!(matches!(err, Error::LockTimeout(_)));
        assert!(h.hooks.calls().is_empty());
        assert!(!h.repo.exists_by_flow(&flow).await.unwrap());

        held.release().unwrap();
        service
            .create(&flow, &"proj-1".into())
            .await
            .expect("lock should be free once released");
    }

    #[tokio::test]
    async fn test_delete_lock_does_not_block_create_scope() {
        let h = harness().await;
        let flow = FlowId::new("flow-1");

        let _held = h
            .locks
            .acquire_lock(&LockOperation::Delete.lock_key(&flow), "other-worker", None)
            .await
            .unwrap();

        // No existing record, so create never needs the delete lock
        h.service
            .create(&flow, &"proj-1".into())
            .await
            .expect("create lock is independent of delete lock");
    }

    #[tokio::test]
    async fn test_blank_ids_rejected_before_locking() {
        let h = harness().await;

        let err = h.service.create(&"".into(), &"proj-1".into()).await.unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
        assert!(h.locks.list_lock_files().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_creates_leave_one_record() {
        let h = harness().await;
        let service = h.service.clone().with_lock_timeout(Duration::from_secs(10));
        let flow = FlowId::new("flow-busy");

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let service = service.clone();
                let flow = flow.clone();
                tokio::spawn(async move { service.create(&flow, &"proj-1".into()).await })
            })
            .collect();

        for handle in handles {
            handle.await.expect("Task panicked").expect("create should succeed");
        }

        assert_eq!(h.repo.count_by_flow(&flow).await.unwrap(), 1);
        assert_unlocked(&h, &flow).await;
    }
}
