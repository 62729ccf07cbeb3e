//! Delivery history handlers.

use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use uuid::Uuid;

use crate::auth::JwtClaims;
use crate::error::{ApiResult, WebhookError};
use crate::models::{DeliveryResponse, DeliveryStatus, ListDeliveriesQuery};
use crate::router::AppState;
use crate::store::{WebhookDelivery, WebhookSubscription};

const MAX_PAGE_SIZE: i64 = 200;

/// List deliveries for a webhook, newest first.
pub async fn list_deliveries_handler(
    State(state): State<AppState>,
    Extension(claims): Extension<JwtClaims>,
    Path(webhook_id): Path<Uuid>,
    Query(query): Query<ListDeliveriesQuery>,
) -> ApiResult<Json<Vec<DeliveryResponse>>> {
    let tenant_id = claims.tenant_id()?;

    // 404 for webhooks the tenant does not own.
    WebhookSubscription::find_by_id(state.pool(), tenant_id, webhook_id)
        .await?
        .ok_or(WebhookError::WebhookNotFound)?;

    let status = match &query.status {
        Some(raw) => Some(
            DeliveryStatus::parse(raw)
                .ok_or_else(|| WebhookError::Validation(format!("Unknown status: {raw}")))?,
        ),
        None => None,
    };

    let limit = query.limit.clamp(1, MAX_PAGE_SIZE);
    let offset = query.offset.max(0);

    let deliveries = WebhookDelivery::list_by_webhook(
        state.pool(),
        tenant_id,
        webhook_id,
        status.map(|s| s.as_str()),
        limit,
        offset,
    )
    .await?;

    let response = deliveries
        .into_iter()
        .filter_map(to_response)
        .collect();

    Ok(Json(response))
}

/// Get one delivery record.
pub async fn get_delivery_handler(
    State(state): State<AppState>,
    Extension(claims): Extension<JwtClaims>,
    Path((webhook_id, delivery_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<Json<DeliveryResponse>> {
    let tenant_id = claims.tenant_id()?;

    let delivery = WebhookDelivery::find_by_id(state.pool(), tenant_id, webhook_id, delivery_id)
        .await?
        .ok_or(WebhookError::DeliveryNotFound)?;

    to_response(delivery)
        .map(Json)
        .ok_or_else(|| WebhookError::Internal("Delivery has unknown status".to_string()))
}

pub(crate) fn to_response(delivery: WebhookDelivery) -> Option<DeliveryResponse> {
    let status = delivery.parsed_status()?;
    Some(DeliveryResponse {
        id: delivery.id,
        webhook_id: delivery.webhook_id,
        event_type: delivery.event_type,
        payload: delivery.payload,
        status,
        response_code: delivery.response_code,
        response_body: delivery.response_body,
        attempt_number: delivery.attempt_number,
        delivered_at: delivery.delivered_at,
        next_retry_at: delivery.next_retry_at,
        created_at: delivery.created_at,
    })
}
