//! Webhook delivery execution service.
//!
//! Responsible for fanning an event out to matching subscriptions, creating
//! delivery records, executing signed HTTP POSTs, and driving the persisted
//! delivery state machine (including retries claimed by the sweep worker).

use chrono::Utc;
use reqwest::Client;
use sqlx::PgPool;

use crate::crypto;
use crate::error::WebhookError;
use crate::models::{WebhookEvent, WirePayload};
use crate::retry::{RetryDecision, RetryPolicy};
use crate::store::{CreateWebhookDelivery, WebhookDelivery, WebhookSubscription};

/// Outbound request timeout.
pub const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Stored response bodies are truncated to this many characters.
pub const MAX_RESPONSE_BODY_CHARS: usize = 1000;

/// Result of one HTTP delivery attempt.
#[derive(Debug, Clone)]
pub struct AttemptOutcome {
    /// True for 2xx responses.
    pub success: bool,
    /// HTTP status, when a response arrived at all.
    pub status_code: Option<i32>,
    /// Response body (truncated) or the transport error message.
    pub body: Option<String>,
}

/// Service for webhook delivery operations.
#[derive(Clone)]
pub struct DeliveryService {
    pool: PgPool,
    http_client: Client,
    encryption_key: Vec<u8>,
}

impl DeliveryService {
    /// Create a new delivery service with a shared HTTP client.
    ///
    /// # Errors
    ///
    /// Returns `WebhookError::Internal` if the HTTP client cannot be built.
    pub fn new(pool: PgPool, encryption_key: Vec<u8>) -> Result<Self, WebhookError> {
        let http_client = Client::builder()
            .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .user_agent("AssetTrack-Webhooks/1.0")
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| WebhookError::Internal(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            pool,
            http_client,
            encryption_key,
        })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Deliver an event to every active subscription matching its type.
    ///
    /// Each subscription gets its own delivery record and attempt; one
    /// endpoint failing never affects the others. Fan-out errors are logged,
    /// not propagated, so event publishers are unaffected by delivery
    /// problems.
    pub async fn deliver_event(&self, event: &WebhookEvent) {
        let subscriptions = match WebhookSubscription::find_active_by_event_type(
            &self.pool,
            event.tenant_id,
            &event.event_type,
        )
        .await
        {
            Ok(subs) => subs,
            Err(e) => {
                tracing::error!(
                    target: "webhook_delivery",
                    event_type = %event.event_type,
                    tenant_id = %event.tenant_id,
                    error = %e,
                    "Failed to query matching subscriptions"
                );
                return;
            }
        };

        if subscriptions.is_empty() {
            tracing::debug!(
                target: "webhook_delivery",
                event_type = %event.event_type,
                tenant_id = %event.tenant_id,
                "No active subscriptions match event type"
            );
            return;
        }

        tracing::info!(
            target: "webhook_delivery",
            event_type = %event.event_type,
            tenant_id = %event.tenant_id,
            subscription_count = subscriptions.len(),
            "Delivering event to matching subscriptions"
        );

        let attempts = subscriptions
            .iter()
            .map(|sub| self.deliver_to_webhook(sub, event));
        futures::future::join_all(attempts).await;
    }

    /// Create a delivery record and run the first attempt against one
    /// subscription. Returns the delivery id when a record was created.
    pub async fn deliver_to_webhook(
        &self,
        subscription: &WebhookSubscription,
        event: &WebhookEvent,
    ) -> Option<uuid::Uuid> {
        let payload_json = match serde_json::to_value(event) {
            Ok(v) => v,
            Err(e) => {
                tracing::error!(
                    target: "webhook_delivery",
                    webhook_id = %subscription.id,
                    error = %e,
                    "Failed to serialize event snapshot"
                );
                return None;
            }
        };

        let delivery = match WebhookDelivery::create(
            &self.pool,
            CreateWebhookDelivery {
                webhook_id: subscription.id,
                event_type: event.event_type.clone(),
                payload: payload_json,
            },
        )
        .await
        {
            Ok(d) => d,
            Err(e) => {
                tracing::error!(
                    target: "webhook_delivery",
                    webhook_id = %subscription.id,
                    event_type = %event.event_type,
                    error = %e,
                    "Failed to create delivery record"
                );
                return None;
            }
        };

        self.execute_attempt(&delivery, subscription, event).await;
        Some(delivery.id)
    }

    /// Run one attempt for a claimed retry.
    ///
    /// The claim already bumped `attempt_number`. The subscription is
    /// re-checked here: deliveries whose webhook was deleted or deactivated
    /// since the retry was scheduled finalize as FAILED instead of hitting
    /// the endpoint.
    pub async fn process_due(&self, delivery: &WebhookDelivery) {
        let subscription =
            match WebhookSubscription::find_by_id_unscoped(&self.pool, delivery.webhook_id).await {
                Ok(Some(sub)) => sub,
                Ok(None) => {
                    self.finalize_orphan(delivery, "Webhook was deleted before retry")
                        .await;
                    return;
                }
                Err(e) => {
                    tracing::error!(
                        target: "webhook_delivery",
                        delivery_id = %delivery.id,
                        error = %e,
                        "Failed to load subscription for retry; lease will re-expire"
                    );
                    return;
                }
            };

        if !subscription.is_active {
            self.finalize_orphan(delivery, "Webhook was deactivated before retry")
                .await;
            return;
        }

        let event: WebhookEvent = match serde_json::from_value(delivery.payload.clone()) {
            Ok(event) => event,
            Err(e) => {
                self.finalize_orphan(delivery, &format!("Unreadable event snapshot: {e}"))
                    .await;
                return;
            }
        };

        self.execute_attempt(delivery, &subscription, &event).await;
    }

    /// Execute one HTTP attempt and apply the resulting state transition.
    async fn execute_attempt(
        &self,
        delivery: &WebhookDelivery,
        subscription: &WebhookSubscription,
        event: &WebhookEvent,
    ) {
        let body = WirePayload::from_event(delivery.id, event);
        let body_bytes = match serde_json::to_vec(&body) {
            Ok(b) => b,
            Err(e) => {
                self.finalize_orphan(delivery, &format!("Failed to serialize payload: {e}"))
                    .await;
                return;
            }
        };

        let secret = match &subscription.secret_encrypted {
            Some(encrypted) => {
                match crypto::decrypt_secret(encrypted, &self.encryption_key) {
                    Ok(secret) => Some(secret),
                    Err(e) => {
                        tracing::warn!(
                            target: "webhook_delivery",
                            delivery_id = %delivery.id,
                            webhook_id = %subscription.id,
                            error = %e,
                            "Failed to decrypt webhook secret, delivering unsigned"
                        );
                        None
                    }
                }
            }
            None => None,
        };
        let signature = crypto::sign_payload(secret.as_deref(), &body_bytes);

        let outcome = post_webhook(
            &self.http_client,
            &subscription.url,
            &body_bytes,
            &signature,
            &event.event_type,
            delivery.id,
            delivery.attempt_number,
        )
        .await;

        self.apply_outcome(delivery, &subscription.retry_policy.0, &outcome)
            .await;
    }

    /// Persist the state transition for an attempt outcome.
    async fn apply_outcome(
        &self,
        delivery: &WebhookDelivery,
        policy: &RetryPolicy,
        outcome: &AttemptOutcome,
    ) {
        let result = if outcome.success {
            tracing::info!(
                target: "webhook_delivery",
                delivery_id = %delivery.id,
                webhook_id = %delivery.webhook_id,
                attempt = delivery.attempt_number,
                status_code = outcome.status_code,
                "Delivery succeeded"
            );
            WebhookDelivery::mark_delivered(
                &self.pool,
                delivery.id,
                outcome.status_code.unwrap_or(200),
                outcome.body.clone(),
            )
            .await
        } else {
            match policy.decide(delivery.attempt_number) {
                RetryDecision::RetryAfter(delay) => {
                    let next_retry_at = Utc::now()
                        + chrono::Duration::from_std(delay)
                            .unwrap_or_else(|_| chrono::Duration::seconds(1));
                    tracing::warn!(
                        target: "webhook_delivery",
                        delivery_id = %delivery.id,
                        webhook_id = %delivery.webhook_id,
                        attempt = delivery.attempt_number,
                        status_code = outcome.status_code,
                        next_retry_at = %next_retry_at,
                        "Delivery failed, retry scheduled"
                    );
                    WebhookDelivery::mark_retrying(
                        &self.pool,
                        delivery.id,
                        outcome.status_code,
                        outcome.body.clone(),
                        next_retry_at,
                    )
                    .await
                }
                RetryDecision::Exhausted => {
                    tracing::error!(
                        target: "webhook_delivery",
                        delivery_id = %delivery.id,
                        webhook_id = %delivery.webhook_id,
                        attempt = delivery.attempt_number,
                        status_code = outcome.status_code,
                        "Delivery exhausted retry budget"
                    );
                    WebhookDelivery::mark_exhausted(
                        &self.pool,
                        delivery.id,
                        outcome.status_code,
                        outcome.body.clone(),
                    )
                    .await
                }
            }
        };

        if let Err(e) = result {
            tracing::error!(
                target: "webhook_delivery",
                delivery_id = %delivery.id,
                error = %e,
                "Failed to persist delivery state transition"
            );
        }
    }

    /// Finalize a delivery as FAILED outside the attempt loop.
    async fn finalize_orphan(&self, delivery: &WebhookDelivery, reason: &str) {
        tracing::warn!(
            target: "webhook_delivery",
            delivery_id = %delivery.id,
            webhook_id = %delivery.webhook_id,
            reason,
            "Finalizing delivery as failed"
        );
        if let Err(e) =
            WebhookDelivery::mark_failed(&self.pool, delivery.id, Some(reason.to_string())).await
        {
            tracing::error!(
                target: "webhook_delivery",
                delivery_id = %delivery.id,
                error = %e,
                "Failed to finalize delivery"
            );
        }
    }
}

/// POST a signed webhook request and classify the outcome.
///
/// Wire contract:
/// - `Content-Type: application/json`
/// - `X-Webhook-Signature`: `sha256=<hex>` over the exact body bytes, or
///   empty when the subscription has no secret
/// - `X-Webhook-Event`: event type
/// - `X-Webhook-Delivery`: delivery id
/// - `X-Webhook-Attempt`: 1-based attempt number
///
/// A 2xx response is success. Any other response, or a transport failure,
/// is a failed attempt; the (truncated) response body or error text is
/// captured for the delivery record.
pub async fn post_webhook(
    client: &Client,
    url: &str,
    body: &[u8],
    signature: &str,
    event_type: &str,
    delivery_id: uuid::Uuid,
    attempt_number: i32,
) -> AttemptOutcome {
    let result = client
        .post(url)
        .header("Content-Type", "application/json")
        .header("X-Webhook-Signature", signature)
        .header("X-Webhook-Event", event_type)
        .header("X-Webhook-Delivery", delivery_id.to_string())
        .header("X-Webhook-Attempt", attempt_number.to_string())
        .body(body.to_vec())
        .send()
        .await;

    match result {
        Ok(response) => {
            let status = response.status();
            let body_text = response.text().await.unwrap_or_default();
            AttemptOutcome {
                success: status.is_success(),
                status_code: Some(i32::from(status.as_u16())),
                body: Some(truncate_body(&body_text)),
            }
        }
        Err(e) => AttemptOutcome {
            success: false,
            status_code: None,
            body: Some(truncate_body(&format!("Request failed: {e}"))),
        },
    }
}

/// Truncate a response body for storage.
pub fn truncate_body(body: &str) -> String {
    body.chars().take(MAX_RESPONSE_BODY_CHARS).collect()
}
