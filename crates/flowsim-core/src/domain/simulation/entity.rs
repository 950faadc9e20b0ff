//! Simulation entity and identifiers

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::error::{Error, Result};

/// Identifier of the flow that owns a simulation (the partition key)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FlowId(String);

impl FlowId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Reject blank identifiers
    pub fn validate(&self) -> Result<()> {
        if self.0.trim().is_empty() {
            return Err(Error::InvalidInput("flow id must not be empty".to_string()));
        }
        Ok(())
    }
}

impl fmt::Display for FlowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FlowId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for FlowId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Identifier of the project a simulation belongs to (the scope key)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectId(String);

impl ProjectId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Reject blank identifiers
    pub fn validate(&self) -> Result<()> {
        if self.0.trim().is_empty() {
            return Err(Error::InvalidInput("project id must not be empty".to_string()));
        }
        Ok(())
    }
}

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ProjectId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for ProjectId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// A persisted webhook simulation
///
/// At most one exists per flow. Records are only ever inserted or
/// removed, never updated in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationResource {
    pub id: Uuid,
    pub flow_id: FlowId,
    pub project_id: ProjectId,
    /// Assigned by the store on insert
    pub created_at: DateTime<Utc>,
    /// Assigned by the store on insert
    pub updated_at: DateTime<Utc>,
}

/// A simulation that has not been stored yet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSimulation {
    pub id: Uuid,
    pub flow_id: FlowId,
    pub project_id: ProjectId,
}

impl NewSimulation {
    /// Build a record with a fresh identifier
    pub fn new(flow_id: FlowId, project_id: ProjectId) -> Self {
        Self {
            id: Uuid::new_v4(),
            flow_id,
            project_id,
        }
    }
}
