//! Simulation repository for database operations

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use super::entity::{FlowId, NewSimulation, ProjectId, SimulationResource};
use super::repository_trait::SimulationRepositoryTrait;
use crate::error::{Error, Result};

/// Repository for simulation database operations
#[derive(Debug, Clone)]
pub struct SimulationRepository {
    pool: SqlitePool,
}

impl SimulationRepository {
    /// Create a new repository with the given connection pool
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Get a reference to the underlying connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Get a simulation by its identifier
    pub async fn get_by_id(&self, id: Uuid) -> Result<Option<SimulationResource>> {
        let row: Option<SimulationRow> = sqlx::query_as(
            r#"
            SELECT id, flow_id, project_id, created_at, updated_at
            FROM webhook_simulations
            WHERE id = ?
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::DatabaseError)?;

        row.map(SimulationRow::into_resource).transpose()
    }

    /// List simulations, newest first
    pub async fn list(&self, limit: Option<i32>) -> Result<Vec<SimulationResource>> {
        let limit = limit.unwrap_or(100);

        let rows: Vec<SimulationRow> = sqlx::query_as(
            r#"
            SELECT id, flow_id, project_id, created_at, updated_at
            FROM webhook_simulations
            ORDER BY created_at DESC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::DatabaseError)?;

        rows.into_iter().map(SimulationRow::into_resource).collect()
    }

    /// Count simulations for a flow
    pub async fn count_by_flow(&self, flow_id: &FlowId) -> Result<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM webhook_simulations WHERE flow_id = ?")
                .bind(flow_id.as_str())
                .fetch_one(&self.pool)
                .await
                .map_err(Error::DatabaseError)?;

        Ok(count)
    }

    /// Count all simulations
    pub async fn count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM webhook_simulations")
            .fetch_one(&self.pool)
            .await
            .map_err(Error::DatabaseError)?;

        Ok(count)
    }
}

#[async_trait]
impl SimulationRepositoryTrait for SimulationRepository {
    async fn exists_by_flow(&self, flow_id: &FlowId) -> Result<bool> {
        Ok(self.count_by_flow(flow_id).await? > 0)
    }

    async fn find_one(
        &self,
        flow_id: &FlowId,
        project_id: &ProjectId,
    ) -> Result<Option<SimulationResource>> {
        let row: Option<SimulationRow> = sqlx::query_as(
            r#"
            SELECT id, flow_id, project_id, created_at, updated_at
            FROM webhook_simulations
            WHERE flow_id = ? AND project_id = ?
            LIMIT 1
            "#,
        )
        .bind(flow_id.as_str())
        .bind(project_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::DatabaseError)?;

        row.map(SimulationRow::into_resource).transpose()
    }

    async fn find_by_flow(&self, flow_id: &FlowId) -> Result<Option<SimulationResource>> {
        let row: Option<SimulationRow> = sqlx::query_as(
            r#"
            SELECT id, flow_id, project_id, created_at, updated_at
            FROM webhook_simulations
            WHERE flow_id = ?
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(flow_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::DatabaseError)?;

        row.map(SimulationRow::into_resource).transpose()
    }

    async fn insert(&self, simulation: &NewSimulation) -> Result<SimulationResource> {
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO webhook_simulations (id, flow_id, project_id, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(simulation.id.to_string())
        .bind(simulation.flow_id.as_str())
        .bind(simulation.project_id.as_str())
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(Error::DatabaseError)?;

        self.get_by_id(simulation.id).await?.ok_or_else(|| {
            Error::StoreFailed(format!(
                "Simulation {} missing immediately after insert",
                simulation.id
            ))
        })
    }

    async fn remove(&self, id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM webhook_simulations WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(Error::DatabaseError)?;

        Ok(())
    }
}

/// Database row for a simulation
#[derive(sqlx::FromRow)]
struct SimulationRow {
    id: String,
    flow_id: String,
    project_id: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl SimulationRow {
    fn into_resource(self) -> Result<SimulationResource> {
        let id = Uuid::parse_str(&self.id)
            .map_err(|e| Error::StoreFailed(format!("Invalid simulation id '{}': {}", self.id, e)))?;

        Ok(SimulationResource {
            id,
            flow_id: FlowId::from(self.flow_id),
            project_id: ProjectId::from(self.project_id),
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}
