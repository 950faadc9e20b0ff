//! Transition hooks
//!
//! Hooks run inside the critical section, before the store mutation they
//! guard. An error from a hook vetoes the transition and is returned to the
//! caller unchanged.

use async_trait::async_trait;
use tracing::info;

use super::entity::{FlowId, ProjectId};
use crate::error::Result;

/// Side effects attached to simulation transitions
#[async_trait]
pub trait SimulationHooks: Send + Sync {
    /// Called before a simulation record is inserted
    async fn before_create(&self, flow_id: &FlowId, project_id: &ProjectId) -> Result<()>;

    /// Called before a simulation record is removed
    async fn before_delete(&self, flow_id: &FlowId, project_id: &ProjectId) -> Result<()>;
}

/// Hooks that do nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHooks;

#[async_trait]
impl SimulationHooks for NoopHooks {
    async fn before_create(&self, _flow_id: &FlowId, _project_id: &ProjectId) -> Result<()> {
        Ok(())
    }

    async fn before_delete(&self, _flow_id: &FlowId, _project_id: &ProjectId) -> Result<()> {
        Ok(())
    }
}

/// Hooks that only record the transition in the log
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingHooks;

#[async_trait]
impl SimulationHooks for LoggingHooks {
    async fn before_create(&self, flow_id: &FlowId, project_id: &ProjectId) -> Result<()> {
        info!(flow_id = %flow_id, project_id = %project_id, "Simulation about to be created");
        Ok(())
    }

    async fn before_delete(&self, flow_id: &FlowId, project_id: &ProjectId) -> Result<()> {
        info!(flow_id = %flow_id, project_id = %project_id, "Simulation about to be deleted");
        Ok(())
    }
}
