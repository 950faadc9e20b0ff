//! Schema for the simulation store
//!
//! The applied version lives in SQLite's `user_version` pragma. Each step
//! runs in its own transaction together with the version bump, so a crash
//! mid-upgrade leaves the previous version intact.

use anyhow::Context;
use sqlx::SqlitePool;

/// Schema version this build expects
pub const SCHEMA_VERSION: i32 = 1;

/// Ordered schema steps; step `n` upgrades version `n - 1` to `n`
///
/// Steps use `IF NOT EXISTS` so two processes racing to create a fresh file
/// both succeed.
///
/// `flow_id` is not unique: the one-record-per-flow rule is enforced by the
/// lifecycle service under its flow lock. The composite index serves the
/// exact `(flow_id, project_id)` lookups, the single-column one serves
/// replace-on-create.
const MIGRATIONS: &[(&str, &str)] = &[(
    "webhook simulations",
    r#"
    CREATE TABLE IF NOT EXISTS webhook_simulations (
        id TEXT PRIMARY KEY NOT NULL,
        flow_id TEXT NOT NULL,
        project_id TEXT NOT NULL,
        created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
        updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
    );
    CREATE INDEX IF NOT EXISTS idx_webhook_simulations_flow_id
        ON webhook_simulations(flow_id);
    CREATE INDEX IF NOT EXISTS idx_webhook_simulations_flow_project
        ON webhook_simulations(flow_id, project_id);
    "#,
)];

/// Read the schema version recorded in the database
pub async fn schema_version(pool: &SqlitePool) -> anyhow::Result<i32> {
    let (version,): (i32,) = sqlx::query_as("PRAGMA user_version")
        .fetch_one(pool)
        .await
        .context("Failed to read schema version")?;
    Ok(version)
}

/// Bring the schema up to [`SCHEMA_VERSION`], returning the version found
pub async fn migrate(pool: &SqlitePool) -> anyhow::Result<i32> {
    let found = schema_version(pool).await?;

    if found > SCHEMA_VERSION {
        anyhow::bail!(
            "Database schema v{} is newer than this build supports (v{})",
            found,
            SCHEMA_VERSION
        );
    }

    for (version, (name, sql)) in (1..).zip(MIGRATIONS.iter()).skip(found as usize) {
        tracing::info!(version, name, "Applying schema migration");

        let mut tx = pool.begin().await?;
        sqlx::raw_sql(sql)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("Migration v{} ({}) failed", version, name))?;
        sqlx::raw_sql(&format!("PRAGMA user_version = {}", version))
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
    }

    if found < SCHEMA_VERSION {
        tracing::info!(from = found, to = SCHEMA_VERSION, "Schema upgraded");
    }
    Ok(found)
}
