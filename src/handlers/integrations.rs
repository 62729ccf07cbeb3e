//! Integration management and sync-trigger handlers.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use uuid::Uuid;
use validator::Validate;

use crate::auth::JwtClaims;
use crate::error::{ApiResult, WebhookError};
use crate::models::{CreateIntegrationRequest, IntegrationResponse, SyncRunResponse};
use crate::router::AppState;

/// Register a new integration.
pub async fn create_integration_handler(
    State(state): State<AppState>,
    Extension(claims): Extension<JwtClaims>,
    Json(request): Json<CreateIntegrationRequest>,
) -> ApiResult<(StatusCode, Json<IntegrationResponse>)> {
    let tenant_id = claims.tenant_id()?;

    request
        .validate()
        .map_err(|e| WebhookError::Validation(e.to_string()))?;

    let response = state.integration_service.create(tenant_id, request).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

/// List the tenant's integrations.
pub async fn list_integrations_handler(
    State(state): State<AppState>,
    Extension(claims): Extension<JwtClaims>,
) -> ApiResult<Json<Vec<IntegrationResponse>>> {
    let tenant_id = claims.tenant_id()?;
    let response = state.integration_service.list(tenant_id).await?;
    Ok(Json(response))
}

/// Get a single integration.
pub async fn get_integration_handler(
    State(state): State<AppState>,
    Extension(claims): Extension<JwtClaims>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<IntegrationResponse>> {
    let tenant_id = claims.tenant_id()?;
    let response = state.integration_service.get(tenant_id, id).await?;
    Ok(Json(response))
}

/// Trigger a sync run. Returns 409 when one is already in progress.
pub async fn trigger_sync_handler(
    State(state): State<AppState>,
    Extension(claims): Extension<JwtClaims>,
    Path(id): Path<Uuid>,
) -> ApiResult<(StatusCode, Json<SyncRunResponse>)> {
    let tenant_id = claims.tenant_id()?;
    let response = state.integration_service.trigger_sync(tenant_id, id).await?;
    Ok((StatusCode::ACCEPTED, Json(response)))
}
