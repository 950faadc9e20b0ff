//! Repository trait for simulation persistence
//!
//! The store is a plain create/read/delete surface. It enforces no
//! uniqueness; the one-per-flow rule belongs to the lifecycle service.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;

use super::entity::{FlowId, NewSimulation, ProjectId, SimulationResource};

/// Repository trait for simulation persistence
#[async_trait]
pub trait SimulationRepositoryTrait: Send + Sync {
    /// Whether any simulation exists for the flow
    async fn exists_by_flow(&self, flow_id: &FlowId) -> Result<bool>;

    /// Find the simulation matching both flow and project exactly
    async fn find_one(
        &self,
        flow_id: &FlowId,
        project_id: &ProjectId,
    ) -> Result<Option<SimulationResource>>;

    /// Find any simulation for the flow, regardless of project
    async fn find_by_flow(&self, flow_id: &FlowId) -> Result<Option<SimulationResource>>;

    /// Insert a new record and return it as persisted
    async fn insert(&self, simulation: &NewSimulation) -> Result<SimulationResource>;

    /// Remove a record by its identifier
    async fn remove(&self, id: Uuid) -> Result<()>;
}
