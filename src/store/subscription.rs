//! `WebhookSubscription` model: tenant-scoped webhook registrations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;

use crate::retry::RetryPolicy;

/// A tenant's registered webhook endpoint.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct WebhookSubscription {
    /// Primary key.
    pub id: Uuid,
    /// Owning tenant; every query is scoped by this column.
    pub tenant_id: Uuid,
    /// Human-readable label.
    pub name: String,
    /// Delivery endpoint URL.
    pub url: String,
    /// Subscribed event type identifiers.
    pub events: Vec<String>,
    /// AES-GCM-encrypted signing secret, or NULL when unsigned.
    pub secret_encrypted: Option<String>,
    /// Inactive subscriptions receive no deliveries, including retries.
    pub is_active: bool,
    /// Per-subscription retry policy.
    pub retry_policy: Json<RetryPolicy>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Data needed to insert a new subscription.
#[derive(Debug, Clone)]
pub struct CreateWebhookSubscription {
    pub tenant_id: Uuid,
    pub name: String,
    pub url: String,
    pub events: Vec<String>,
    pub secret_encrypted: Option<String>,
    pub retry_policy: RetryPolicy,
}

/// Partial update; `None` fields keep their current value.
#[derive(Debug, Clone, Default)]
pub struct UpdateWebhookSubscription {
    pub name: Option<String>,
    pub url: Option<String>,
    pub events: Option<Vec<String>>,
    pub secret_encrypted: Option<String>,
    pub is_active: Option<bool>,
    pub retry_policy: Option<RetryPolicy>,
}

impl WebhookSubscription {
    /// Insert a new subscription.
    pub async fn create(
        pool: &sqlx::PgPool,
        data: CreateWebhookSubscription,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as(
            r"
            INSERT INTO webhooks (tenant_id, name, url, events, secret_encrypted, retry_policy)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            ",
        )
        .bind(data.tenant_id)
        .bind(&data.name)
        .bind(&data.url)
        .bind(&data.events)
        .bind(&data.secret_encrypted)
        .bind(Json(data.retry_policy))
        .fetch_one(pool)
        .await
    }

    /// Find a subscription by id within a tenant.
    pub async fn find_by_id(
        pool: &sqlx::PgPool,
        tenant_id: Uuid,
        id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as(
            r"
            SELECT * FROM webhooks
            WHERE id = $1 AND tenant_id = $2
            ",
        )
        .bind(id)
        .bind(tenant_id)
        .fetch_optional(pool)
        .await
    }

    /// Find a subscription by id regardless of tenant.
    ///
    /// Used by the retry worker, which operates outside a request context.
    pub async fn find_by_id_unscoped(
        pool: &sqlx::PgPool,
        id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as(
            r"
            SELECT * FROM webhooks
            WHERE id = $1
            ",
        )
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    /// List a tenant's subscriptions, newest first.
    pub async fn list_by_tenant(
        pool: &sqlx::PgPool,
        tenant_id: Uuid,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as(
            r"
            SELECT * FROM webhooks
            WHERE tenant_id = $1
            ORDER BY created_at DESC
            ",
        )
        .bind(tenant_id)
        .fetch_all(pool)
        .await
    }

    /// Active subscriptions within a tenant listening to an event type.
    pub async fn find_active_by_event_type(
        pool: &sqlx::PgPool,
        tenant_id: Uuid,
        event_type: &str,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as(
            r"
            SELECT * FROM webhooks
            WHERE tenant_id = $1 AND is_active = TRUE AND $2 = ANY(events)
            ",
        )
        .bind(tenant_id)
        .bind(event_type)
        .fetch_all(pool)
        .await
    }

    /// Apply a partial update; returns the updated row if it exists.
    pub async fn update(
        pool: &sqlx::PgPool,
        tenant_id: Uuid,
        id: Uuid,
        data: UpdateWebhookSubscription,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as(
            r"
            UPDATE webhooks
            SET name = COALESCE($3, name),
                url = COALESCE($4, url),
                events = COALESCE($5, events),
                secret_encrypted = COALESCE($6, secret_encrypted),
                is_active = COALESCE($7, is_active),
                retry_policy = COALESCE($8, retry_policy),
                updated_at = NOW()
            WHERE id = $1 AND tenant_id = $2
            RETURNING *
            ",
        )
        .bind(id)
        .bind(tenant_id)
        .bind(&data.name)
        .bind(&data.url)
        .bind(&data.events)
        .bind(&data.secret_encrypted)
        .bind(data.is_active)
        .bind(data.retry_policy.map(Json))
        .fetch_optional(pool)
        .await
    }

    /// Delete a subscription; returns true if a row was removed.
    pub async fn delete(
        pool: &sqlx::PgPool,
        tenant_id: Uuid,
        id: Uuid,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r"
            DELETE FROM webhooks
            WHERE id = $1 AND tenant_id = $2
            ",
        )
        .bind(id)
        .bind(tenant_id)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
