//! CRUD and test-delivery handlers for webhook subscriptions.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use uuid::Uuid;
use validator::Validate;

use crate::auth::JwtClaims;
use crate::error::{ApiResult, WebhookError};
use crate::models::{
    CreateWebhookRequest, DeliveryResponse, EventTypeInfo, EventTypeListResponse,
    UpdateWebhookRequest, WebhookEventType, WebhookResponse,
};
use crate::router::AppState;

/// Create a new webhook subscription.
pub async fn create_webhook_handler(
    State(state): State<AppState>,
    Extension(claims): Extension<JwtClaims>,
    Json(request): Json<CreateWebhookRequest>,
) -> ApiResult<(StatusCode, Json<WebhookResponse>)> {
    let tenant_id = claims.tenant_id()?;

    request
        .validate()
        .map_err(|e| WebhookError::Validation(e.to_string()))?;

    let response = state
        .subscription_service
        .create(tenant_id, request)
        .await?;

    Ok((StatusCode::CREATED, Json(response)))
}

/// List the tenant's webhook subscriptions.
pub async fn list_webhooks_handler(
    State(state): State<AppState>,
    Extension(claims): Extension<JwtClaims>,
) -> ApiResult<Json<Vec<WebhookResponse>>> {
    let tenant_id = claims.tenant_id()?;
    let response = state.subscription_service.list(tenant_id).await?;
    Ok(Json(response))
}

/// Get a single webhook subscription.
pub async fn get_webhook_handler(
    State(state): State<AppState>,
    Extension(claims): Extension<JwtClaims>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<WebhookResponse>> {
    let tenant_id = claims.tenant_id()?;
    let response = state.subscription_service.get(tenant_id, id).await?;
    Ok(Json(response))
}

/// Partially update a webhook subscription.
pub async fn update_webhook_handler(
    State(state): State<AppState>,
    Extension(claims): Extension<JwtClaims>,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateWebhookRequest>,
) -> ApiResult<Json<WebhookResponse>> {
    let tenant_id = claims.tenant_id()?;

    request
        .validate()
        .map_err(|e| WebhookError::Validation(e.to_string()))?;

    let response = state
        .subscription_service
        .update(tenant_id, id, request)
        .await?;

    Ok(Json(response))
}

/// Delete a webhook subscription. Delivery history is retained.
pub async fn delete_webhook_handler(
    State(state): State<AppState>,
    Extension(claims): Extension<JwtClaims>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    let tenant_id = claims.tenant_id()?;
    state.subscription_service.delete(tenant_id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Send a test event through a webhook's full delivery path and return the
/// resulting delivery record.
pub async fn test_webhook_handler(
    State(state): State<AppState>,
    Extension(claims): Extension<JwtClaims>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<DeliveryResponse>> {
    let tenant_id = claims.tenant_id()?;
    let delivery = state
        .subscription_service
        .send_test(&state.delivery_service, tenant_id, id)
        .await?;

    crate::handlers::deliveries::to_response(delivery)
        .map(Json)
        .ok_or_else(|| WebhookError::Internal("Delivery has unknown status".to_string()))
}

/// List the catalog of subscribable event types.
pub async fn list_event_types_handler() -> Json<EventTypeListResponse> {
    let event_types = WebhookEventType::all()
        .iter()
        .map(|et| EventTypeInfo {
            event_type: et.as_str().to_string(),
            category: et.category().to_string(),
            description: et.description().to_string(),
        })
        .collect();

    Json(EventTypeListResponse { event_types })
}
