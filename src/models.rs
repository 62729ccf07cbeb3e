//! Domain events, delivery statuses, and API request/response types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::retry::RetryPolicy;

// ---------------------------------------------------------------------------
// Event types
// ---------------------------------------------------------------------------

/// Domain events that webhook subscriptions can listen to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WebhookEventType {
    AssetCreated,
    AssetUpdated,
    AssetDeleted,
    AssetAssigned,
    MaintenanceScheduled,
    MaintenanceCompleted,
    IntegrationSyncStarted,
    IntegrationSyncCompleted,
    WebhookTest,
}

impl WebhookEventType {
    /// All known event types.
    pub fn all() -> &'static [WebhookEventType] {
        &[
            Self::AssetCreated,
            Self::AssetUpdated,
            Self::AssetDeleted,
            Self::AssetAssigned,
            Self::MaintenanceScheduled,
            Self::MaintenanceCompleted,
            Self::IntegrationSyncStarted,
            Self::IntegrationSyncCompleted,
            Self::WebhookTest,
        ]
    }

    /// Wire identifier, e.g. `asset.created`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AssetCreated => "asset.created",
            Self::AssetUpdated => "asset.updated",
            Self::AssetDeleted => "asset.deleted",
            Self::AssetAssigned => "asset.assigned",
            Self::MaintenanceScheduled => "maintenance.scheduled",
            Self::MaintenanceCompleted => "maintenance.completed",
            Self::IntegrationSyncStarted => "integration.sync.started",
            Self::IntegrationSyncCompleted => "integration.sync.completed",
            Self::WebhookTest => "webhook.test",
        }
    }

    /// Parse a wire identifier; None for unknown types.
    pub fn parse(s: &str) -> Option<Self> {
        Self::all().iter().copied().find(|et| et.as_str() == s)
    }

    /// Coarse grouping used by the event-type catalog endpoint.
    pub fn category(&self) -> &'static str {
        match self {
            Self::AssetCreated | Self::AssetUpdated | Self::AssetDeleted | Self::AssetAssigned => {
                "asset"
            }
            Self::MaintenanceScheduled | Self::MaintenanceCompleted => "maintenance",
            Self::IntegrationSyncStarted | Self::IntegrationSyncCompleted => "integration",
            Self::WebhookTest => "webhook",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::AssetCreated => "An asset was created",
            Self::AssetUpdated => "An asset was updated",
            Self::AssetDeleted => "An asset was deleted",
            Self::AssetAssigned => "An asset was assigned to a user or location",
            Self::MaintenanceScheduled => "Maintenance was scheduled for an asset",
            Self::MaintenanceCompleted => "A maintenance task was completed",
            Self::IntegrationSyncStarted => "An integration sync run started",
            Self::IntegrationSyncCompleted => "An integration sync run completed",
            Self::WebhookTest => "Operator-triggered test delivery",
        }
    }
}

impl std::fmt::Display for WebhookEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Domain event
// ---------------------------------------------------------------------------

/// A domain event flowing into webhook fan-out.
///
/// This struct is also the payload snapshot persisted on each delivery row,
/// so retries re-deliver exactly what was captured at publish time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: serde_json::Value,
    pub tenant_id: Uuid,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl WebhookEvent {
    pub fn new(event_type: WebhookEventType, tenant_id: Uuid, data: serde_json::Value) -> Self {
        Self {
            event_type: event_type.as_str().to_string(),
            data,
            tenant_id,
            timestamp: Utc::now(),
            metadata: None,
        }
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// The exact JSON body POSTed to a webhook endpoint.
///
/// Field order and names are part of the wire contract; receivers verify the
/// HMAC signature against these exact bytes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WirePayload {
    /// Delivery id (stable across retries of the same delivery).
    pub id: Uuid,
    /// Event type tag.
    pub event: String,
    pub data: serde_json::Value,
    pub timestamp: DateTime<Utc>,
    pub tenant_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl WirePayload {
    /// Build the wire body for a delivery from its persisted event snapshot.
    pub fn from_event(delivery_id: Uuid, event: &WebhookEvent) -> Self {
        Self {
            id: delivery_id,
            event: event.event_type.clone(),
            data: event.data.clone(),
            timestamp: event.timestamp,
            tenant_id: event.tenant_id,
            metadata: event.metadata.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Delivery status
// ---------------------------------------------------------------------------

/// Persisted delivery state machine.
///
/// PENDING -> DELIVERED | RETRYING -> ... -> DELIVERED | EXHAUSTED.
/// FAILED is reserved for deliveries finalized outside the attempt loop
/// (e.g. the subscription was deleted before a scheduled retry fired).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeliveryStatus {
    Pending,
    Delivered,
    Failed,
    Retrying,
    Exhausted,
}

impl DeliveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Delivered => "DELIVERED",
            Self::Failed => "FAILED",
            Self::Retrying => "RETRYING",
            Self::Exhausted => "EXHAUSTED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(Self::Pending),
            "DELIVERED" => Some(Self::Delivered),
            "FAILED" => Some(Self::Failed),
            "RETRYING" => Some(Self::Retrying),
            "EXHAUSTED" => Some(Self::Exhausted),
            _ => None,
        }
    }

    /// Terminal states accept no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Delivered | Self::Failed | Self::Exhausted)
    }
}

// ---------------------------------------------------------------------------
// Webhook API types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, Validate)]
pub struct CreateWebhookRequest {
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    #[validate(length(min = 1, max = 2048))]
    pub url: String,
    #[validate(length(min = 1))]
    pub events: Vec<String>,
    pub secret: Option<String>,
    pub retry_policy: Option<RetryPolicy>,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateWebhookRequest {
    #[validate(length(min = 1, max = 255))]
    pub name: Option<String>,
    #[validate(length(min = 1, max = 2048))]
    pub url: Option<String>,
    pub events: Option<Vec<String>>,
    pub secret: Option<String>,
    pub is_active: Option<bool>,
    pub retry_policy: Option<RetryPolicy>,
}

/// Webhook subscription as returned by the API.
///
/// `secret` is write-only: it is populated exactly once, in the create
/// response for an auto-generated secret, and omitted everywhere else.
#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    pub url: String,
    pub events: Vec<String>,
    pub is_active: bool,
    pub retry_policy: RetryPolicy,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct EventTypeInfo {
    pub event_type: String,
    pub category: String,
    pub description: String,
}

#[derive(Debug, Serialize)]
pub struct EventTypeListResponse {
    pub event_types: Vec<EventTypeInfo>,
}

// ---------------------------------------------------------------------------
// Delivery API types
// ---------------------------------------------------------------------------

fn default_limit() -> i64 {
    50
}

#[derive(Debug, Deserialize)]
pub struct ListDeliveriesQuery {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
    pub status: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DeliveryResponse {
    pub id: Uuid,
    pub webhook_id: Uuid,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub status: DeliveryStatus,
    pub response_code: Option<i32>,
    pub response_body: Option<String>,
    pub attempt_number: i32,
    pub delivered_at: Option<DateTime<Utc>>,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Integration API types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, Validate)]
pub struct CreateIntegrationRequest {
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    #[validate(length(min = 1, max = 64))]
    pub kind: String,
}

#[derive(Debug, Serialize)]
pub struct IntegrationResponse {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    pub kind: String,
    pub status: String,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct SyncRunResponse {
    pub id: Uuid,
    pub integration_id: Uuid,
    pub status: String,
    pub records_processed: i32,
    pub records_succeeded: i32,
    pub records_failed: i32,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
