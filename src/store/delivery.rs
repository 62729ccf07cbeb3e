//! `WebhookDelivery` model: the persisted delivery state machine.
//!
//! Status transitions: PENDING -> DELIVERED | RETRYING, RETRYING ->
//! DELIVERED | RETRYING | EXHAUSTED | FAILED. Rows outlive their webhook so
//! delivery history survives subscription deletion.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::models::DeliveryStatus;

/// Seconds a claimed delivery stays invisible to other workers. If the
/// process dies mid-attempt, the row becomes due again once this expires.
pub const CLAIM_LEASE_SECS: i64 = 90;

/// One delivery of one event to one webhook, across all its attempts.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct WebhookDelivery {
    /// Primary key; also the `id` field of the wire payload.
    pub id: Uuid,
    /// Target webhook. Not a foreign key: history persists after deletion.
    pub webhook_id: Uuid,
    pub event_type: String,
    /// Event snapshot captured at publish time; retries re-send this.
    pub payload: serde_json::Value,
    /// Current state machine status (uppercase).
    pub status: String,
    /// HTTP status of the most recent attempt, when a response arrived.
    pub response_code: Option<i32>,
    /// Response body of the most recent attempt, truncated to 1000 chars.
    pub response_body: Option<String>,
    /// 1-based attempt counter; incremented when an attempt is claimed.
    pub attempt_number: i32,
    pub delivered_at: Option<DateTime<Utc>>,
    /// When the next retry is due. Doubles as the claim lease while an
    /// attempt is in flight.
    pub next_retry_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Data needed to insert a new delivery row.
#[derive(Debug, Clone)]
pub struct CreateWebhookDelivery {
    pub webhook_id: Uuid,
    pub event_type: String,
    pub payload: serde_json::Value,
}

impl WebhookDelivery {
    /// Parsed status; `None` if the stored value is outside the known set.
    pub fn parsed_status(&self) -> Option<DeliveryStatus> {
        DeliveryStatus::parse(&self.status)
    }

    /// Insert a new delivery in PENDING with attempt_number 1.
    ///
    /// The row exists before the first HTTP attempt runs, so a crash
    /// mid-attempt leaves an auditable record.
    pub async fn create(
        pool: &sqlx::PgPool,
        data: CreateWebhookDelivery,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as(
            r"
            INSERT INTO webhook_deliveries (webhook_id, event_type, payload, status, attempt_number)
            VALUES ($1, $2, $3, 'PENDING', 1)
            RETURNING *
            ",
        )
        .bind(data.webhook_id)
        .bind(&data.event_type)
        .bind(&data.payload)
        .fetch_one(pool)
        .await
    }

    /// Finalize as DELIVERED with the successful response.
    pub async fn mark_delivered(
        pool: &sqlx::PgPool,
        id: Uuid,
        response_code: i32,
        response_body: Option<String>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r"
            UPDATE webhook_deliveries
            SET status = 'DELIVERED',
                response_code = $2,
                response_body = $3,
                delivered_at = NOW(),
                next_retry_at = NULL
            WHERE id = $1
            ",
        )
        .bind(id)
        .bind(response_code)
        .bind(&response_body)
        .execute(pool)
        .await?;

        Ok(())
    }

    /// Record a failed attempt and schedule the next one.
    pub async fn mark_retrying(
        pool: &sqlx::PgPool,
        id: Uuid,
        response_code: Option<i32>,
        response_body: Option<String>,
        next_retry_at: DateTime<Utc>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r"
            UPDATE webhook_deliveries
            SET status = 'RETRYING',
                response_code = $2,
                response_body = $3,
                next_retry_at = $4
            WHERE id = $1
            ",
        )
        .bind(id)
        .bind(response_code)
        .bind(&response_body)
        .bind(next_retry_at)
        .execute(pool)
        .await?;

        Ok(())
    }

    /// Finalize as EXHAUSTED: the attempt budget is spent.
    pub async fn mark_exhausted(
        pool: &sqlx::PgPool,
        id: Uuid,
        response_code: Option<i32>,
        response_body: Option<String>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r"
            UPDATE webhook_deliveries
            SET status = 'EXHAUSTED',
                response_code = $2,
                response_body = $3,
                next_retry_at = NULL
            WHERE id = $1
            ",
        )
        .bind(id)
        .bind(response_code)
        .bind(&response_body)
        .execute(pool)
        .await?;

        Ok(())
    }

    /// Finalize as FAILED outside the attempt loop, e.g. when the webhook
    /// was deleted or deactivated before a scheduled retry fired.
    pub async fn mark_failed(
        pool: &sqlx::PgPool,
        id: Uuid,
        response_body: Option<String>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r"
            UPDATE webhook_deliveries
            SET status = 'FAILED',
                response_body = $2,
                next_retry_at = NULL
            WHERE id = $1
            ",
        )
        .bind(id)
        .bind(&response_body)
        .execute(pool)
        .await?;

        Ok(())
    }

    /// Claim a batch of due retries.
    ///
    /// Atomically increments `attempt_number` and pushes `next_retry_at`
    /// forward by the claim lease, so the attempt counter is persisted
    /// before the HTTP request runs and concurrent workers (via
    /// FOR UPDATE SKIP LOCKED) never claim the same row.
    pub async fn claim_due(pool: &sqlx::PgPool, limit: i64) -> Result<Vec<Self>, sqlx::Error> {
        let lease_until = Utc::now() + Duration::seconds(CLAIM_LEASE_SECS);

        sqlx::query_as(
            r"
            UPDATE webhook_deliveries AS d
            SET attempt_number = d.attempt_number + 1,
                next_retry_at = $2
            FROM (
                SELECT id FROM webhook_deliveries
                WHERE status = 'RETRYING' AND next_retry_at <= NOW()
                ORDER BY next_retry_at
                LIMIT $1
                FOR UPDATE SKIP LOCKED
            ) AS due
            WHERE d.id = due.id
            RETURNING d.*
            ",
        )
        .bind(limit)
        .bind(lease_until)
        .fetch_all(pool)
        .await
    }

    /// Find a delivery by id, scoped to the tenant that owns its webhook.
    pub async fn find_by_id(
        pool: &sqlx::PgPool,
        tenant_id: Uuid,
        webhook_id: Uuid,
        id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as(
            r"
            SELECT d.* FROM webhook_deliveries d
            JOIN webhooks w ON w.id = d.webhook_id
            WHERE d.id = $1 AND d.webhook_id = $2 AND w.tenant_id = $3
            ",
        )
        .bind(id)
        .bind(webhook_id)
        .bind(tenant_id)
        .fetch_optional(pool)
        .await
    }

    /// List deliveries for a webhook, newest first, with optional status
    /// filtering.
    pub async fn list_by_webhook(
        pool: &sqlx::PgPool,
        tenant_id: Uuid,
        webhook_id: Uuid,
        status: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as(
            r"
            SELECT d.* FROM webhook_deliveries d
            JOIN webhooks w ON w.id = d.webhook_id
            WHERE d.webhook_id = $1 AND w.tenant_id = $2
              AND ($3::text IS NULL OR d.status = $3)
            ORDER BY d.created_at DESC
            LIMIT $4 OFFSET $5
            ",
        )
        .bind(webhook_id)
        .bind(tenant_id)
        .bind(status)
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await
    }
}
