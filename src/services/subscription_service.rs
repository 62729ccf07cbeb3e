//! Webhook subscription management service.
//!
//! Validates and persists subscription CRUD, encrypts signing secrets at
//! rest, and drives operator-triggered test deliveries.

use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use crate::crypto;
use crate::error::WebhookError;
use crate::models::{
    CreateWebhookRequest, UpdateWebhookRequest, WebhookEvent, WebhookEventType, WebhookResponse,
};
use crate::retry::RetryPolicy;
use crate::services::DeliveryService;
use crate::store::{
    CreateWebhookSubscription, UpdateWebhookSubscription, WebhookDelivery, WebhookSubscription,
};
use crate::validation;

/// Service for webhook subscription CRUD and test deliveries.
#[derive(Clone)]
pub struct SubscriptionService {
    pool: PgPool,
    encryption_key: Vec<u8>,
    /// Production mode enables strict URL/SSRF validation.
    production: bool,
}

impl SubscriptionService {
    pub fn new(pool: PgPool, encryption_key: Vec<u8>, production: bool) -> Self {
        Self {
            pool,
            encryption_key,
            production,
        }
    }

    /// Create a subscription.
    ///
    /// When no secret is supplied one is generated, and the plaintext is
    /// returned in the response exactly once. Only the encrypted form is
    /// ever stored.
    pub async fn create(
        &self,
        tenant_id: Uuid,
        request: CreateWebhookRequest,
    ) -> Result<WebhookResponse, WebhookError> {
        validation::validate_webhook_url(&request.url, self.production)?;
        validation::validate_event_types(&request.events)?;

        let retry_policy = request.retry_policy.unwrap_or_default();
        retry_policy.validate()?;

        let (secret, generated) = match request.secret {
            Some(secret) if !secret.is_empty() => (secret, false),
            _ => (crypto::generate_secret(), true),
        };
        let secret_encrypted = crypto::encrypt_secret(&secret, &self.encryption_key)?;

        let subscription = WebhookSubscription::create(
            &self.pool,
            CreateWebhookSubscription {
                tenant_id,
                name: request.name,
                url: request.url,
                events: request.events,
                secret_encrypted: Some(secret_encrypted),
                retry_policy,
            },
        )
        .await?;

        tracing::info!(
            target: "webhook_registry",
            webhook_id = %subscription.id,
            tenant_id = %tenant_id,
            "Webhook created"
        );

        // Generated secrets are disclosed once, in this response only.
        let secret_out = generated.then_some(secret);
        Ok(to_response(subscription, secret_out))
    }

    pub async fn get(
        &self,
        tenant_id: Uuid,
        id: Uuid,
    ) -> Result<WebhookResponse, WebhookError> {
        let subscription = WebhookSubscription::find_by_id(&self.pool, tenant_id, id)
            .await?
            .ok_or(WebhookError::WebhookNotFound)?;
        Ok(to_response(subscription, None))
    }

    pub async fn list(&self, tenant_id: Uuid) -> Result<Vec<WebhookResponse>, WebhookError> {
        let subscriptions = WebhookSubscription::list_by_tenant(&self.pool, tenant_id).await?;
        Ok(subscriptions
            .into_iter()
            .map(|sub| to_response(sub, None))
            .collect())
    }

    /// Apply a partial update, re-validating any changed field.
    pub async fn update(
        &self,
        tenant_id: Uuid,
        id: Uuid,
        request: UpdateWebhookRequest,
    ) -> Result<WebhookResponse, WebhookError> {
        if let Some(url) = &request.url {
            validation::validate_webhook_url(url, self.production)?;
        }
        if let Some(events) = &request.events {
            validation::validate_event_types(events)?;
        }
        if let Some(policy) = &request.retry_policy {
            policy.validate()?;
        }

        let secret_encrypted = match request.secret {
            Some(secret) if !secret.is_empty() => {
                Some(crypto::encrypt_secret(&secret, &self.encryption_key)?)
            }
            _ => None,
        };

        let subscription = WebhookSubscription::update(
            &self.pool,
            tenant_id,
            id,
            UpdateWebhookSubscription {
                name: request.name,
                url: request.url,
                events: request.events,
                secret_encrypted,
                is_active: request.is_active,
                retry_policy: request.retry_policy,
            },
        )
        .await?
        .ok_or(WebhookError::WebhookNotFound)?;

        tracing::info!(
            target: "webhook_registry",
            webhook_id = %subscription.id,
            tenant_id = %tenant_id,
            "Webhook updated"
        );

        Ok(to_response(subscription, None))
    }

    /// Delete a subscription. Delivery history is retained.
    pub async fn delete(&self, tenant_id: Uuid, id: Uuid) -> Result<(), WebhookError> {
        let deleted = WebhookSubscription::delete(&self.pool, tenant_id, id).await?;
        if !deleted {
            return Err(WebhookError::WebhookNotFound);
        }

        tracing::info!(
            target: "webhook_registry",
            webhook_id = %id,
            tenant_id = %tenant_id,
            "Webhook deleted"
        );

        Ok(())
    }

    /// Send a `webhook.test` event through the full delivery path of one
    /// subscription, signature and retry semantics included. Returns the
    /// resulting delivery record.
    pub async fn send_test(
        &self,
        delivery: &DeliveryService,
        tenant_id: Uuid,
        id: Uuid,
    ) -> Result<WebhookDelivery, WebhookError> {
        let subscription = WebhookSubscription::find_by_id(&self.pool, tenant_id, id)
            .await?
            .ok_or(WebhookError::WebhookNotFound)?;

        let event = WebhookEvent::new(
            WebhookEventType::WebhookTest,
            tenant_id,
            serde_json::json!({
                "message": "This is a test webhook delivery",
                "timestamp": Utc::now(),
            }),
        )
        .with_metadata(serde_json::json!({ "test": true }));

        let delivery_id = delivery
            .deliver_to_webhook(&subscription, &event)
            .await
            .ok_or_else(|| {
                WebhookError::Internal("Failed to create test delivery".to_string())
            })?;

        WebhookDelivery::find_by_id(&self.pool, tenant_id, id, delivery_id)
            .await?
            .ok_or(WebhookError::DeliveryNotFound)
    }
}

/// Map a stored subscription to its API shape.
fn to_response(subscription: WebhookSubscription, secret: Option<String>) -> WebhookResponse {
    WebhookResponse {
        id: subscription.id,
        tenant_id: subscription.tenant_id,
        name: subscription.name,
        url: subscription.url,
        events: subscription.events,
        is_active: subscription.is_active,
        retry_policy: subscription.retry_policy.0,
        secret,
        created_at: subscription.created_at,
        updated_at: subscription.updated_at,
    }
}
