//! `Integration` and `IntegrationSyncRun` models.
//!
//! Integrations connect external systems (ERP, procurement, MDM) to the
//! asset inventory. A sync run imports records and fires
//! `integration.sync.*` events; at most one run per integration is active
//! at a time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A configured external-system connection.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Integration {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    /// Connector kind, e.g. `sap`, `jamf`, `intune`.
    pub kind: String,
    /// CONNECTED | SYNCING | ERROR | DISABLED.
    pub status: String,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One sync execution of an integration.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct IntegrationSyncRun {
    pub id: Uuid,
    pub integration_id: Uuid,
    /// RUNNING | COMPLETED | FAILED.
    pub status: String,
    pub records_processed: i32,
    pub records_succeeded: i32,
    pub records_failed: i32,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Data needed to insert a new integration.
#[derive(Debug, Clone)]
pub struct CreateIntegration {
    pub tenant_id: Uuid,
    pub name: String,
    pub kind: String,
}

/// Record counts from a completed sync run.
#[derive(Debug, Clone, Copy, Default)]
pub struct SyncStats {
    pub processed: i32,
    pub succeeded: i32,
    pub failed: i32,
}

impl Integration {
    pub async fn create(
        pool: &sqlx::PgPool,
        data: CreateIntegration,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as(
            r"
            INSERT INTO integrations (tenant_id, name, kind, status)
            VALUES ($1, $2, $3, 'CONNECTED')
            RETURNING *
            ",
        )
        .bind(data.tenant_id)
        .bind(&data.name)
        .bind(&data.kind)
        .fetch_one(pool)
        .await
    }

    pub async fn find_by_id(
        pool: &sqlx::PgPool,
        tenant_id: Uuid,
        id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as(
            r"
            SELECT * FROM integrations
            WHERE id = $1 AND tenant_id = $2
            ",
        )
        .bind(id)
        .bind(tenant_id)
        .fetch_optional(pool)
        .await
    }

    pub async fn list_by_tenant(
        pool: &sqlx::PgPool,
        tenant_id: Uuid,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as(
            r"
            SELECT * FROM integrations
            WHERE tenant_id = $1
            ORDER BY created_at DESC
            ",
        )
        .bind(tenant_id)
        .fetch_all(pool)
        .await
    }

    /// Atomically move an integration into SYNCING.
    ///
    /// The conditional UPDATE makes concurrent sync triggers race-safe:
    /// exactly one caller gets the row back, the rest see `None` and must
    /// return a conflict.
    pub async fn try_begin_sync(
        pool: &sqlx::PgPool,
        tenant_id: Uuid,
        id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as(
            r"
            UPDATE integrations
            SET status = 'SYNCING', updated_at = NOW()
            WHERE id = $1 AND tenant_id = $2 AND status <> 'SYNCING'
            RETURNING *
            ",
        )
        .bind(id)
        .bind(tenant_id)
        .fetch_optional(pool)
        .await
    }

    /// Leave SYNCING after a run finishes, recording the outcome status.
    pub async fn complete_sync(
        pool: &sqlx::PgPool,
        id: Uuid,
        success: bool,
    ) -> Result<(), sqlx::Error> {
        let status = if success { "CONNECTED" } else { "ERROR" };
        sqlx::query(
            r"
            UPDATE integrations
            SET status = $2,
                last_synced_at = CASE WHEN $3 THEN NOW() ELSE last_synced_at END,
                updated_at = NOW()
            WHERE id = $1
            ",
        )
        .bind(id)
        .bind(status)
        .bind(success)
        .execute(pool)
        .await?;

        Ok(())
    }
}

impl IntegrationSyncRun {
    /// Insert a RUNNING sync run.
    pub async fn create(pool: &sqlx::PgPool, integration_id: Uuid) -> Result<Self, sqlx::Error> {
        sqlx::query_as(
            r"
            INSERT INTO integration_sync_runs (integration_id, status)
            VALUES ($1, 'RUNNING')
            RETURNING *
            ",
        )
        .bind(integration_id)
        .fetch_one(pool)
        .await
    }

    /// Finalize a run with its record counts.
    pub async fn complete(
        pool: &sqlx::PgPool,
        id: Uuid,
        success: bool,
        stats: SyncStats,
    ) -> Result<(), sqlx::Error> {
        let status = if success { "COMPLETED" } else { "FAILED" };
        sqlx::query(
            r"
            UPDATE integration_sync_runs
            SET status = $2,
                records_processed = $3,
                records_succeeded = $4,
                records_failed = $5,
                completed_at = NOW()
            WHERE id = $1
            ",
        )
        .bind(id)
        .bind(status)
        .bind(stats.processed)
        .bind(stats.succeeded)
        .bind(stats.failed)
        .execute(pool)
        .await?;

        Ok(())
    }
}
