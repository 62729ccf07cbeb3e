//! Axum router setup for the webhook API.

use std::sync::Arc;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use sqlx::PgPool;

use crate::auth::auth_middleware;
use crate::config::AppConfig;
use crate::error::WebhookError;
use crate::handlers::{deliveries, health, integrations, subscriptions};
use crate::rate_limit::{rate_limit_middleware, SlidingWindowLimiter};
use crate::services::{DeliveryService, IntegrationService, SubscriptionService};

/// Shared state for all handlers and middleware.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub subscription_service: Arc<SubscriptionService>,
    pub delivery_service: Arc<DeliveryService>,
    pub integration_service: Arc<IntegrationService>,
    pub rate_limiter: Arc<SlidingWindowLimiter>,
    pool: PgPool,
}

impl AppState {
    pub fn new(pool: PgPool, config: AppConfig) -> Result<Self, WebhookError> {
        let delivery_service =
            DeliveryService::new(pool.clone(), config.encryption_key.clone())?;
        let subscription_service = SubscriptionService::new(
            pool.clone(),
            config.encryption_key.clone(),
            config.production,
        );
        let integration_service =
            IntegrationService::new(pool.clone(), delivery_service.clone());

        Ok(Self {
            config: Arc::new(config),
            subscription_service: Arc::new(subscription_service),
            delivery_service: Arc::new(delivery_service),
            integration_service: Arc::new(integration_service),
            rate_limiter: Arc::new(SlidingWindowLimiter::default()),
            pool,
        })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Build the API router.
///
/// All routes except `/health` sit behind bearer authentication and the
/// per-caller rate limit. Authentication runs first so the limiter can key
/// on the token subject.
pub fn api_router(state: AppState) -> Router {
    let protected = Router::new()
        // Webhook CRUD
        .route(
            "/webhooks",
            post(subscriptions::create_webhook_handler)
                .get(subscriptions::list_webhooks_handler),
        )
        .route(
            "/webhooks/:id",
            get(subscriptions::get_webhook_handler)
                .patch(subscriptions::update_webhook_handler)
                .delete(subscriptions::delete_webhook_handler),
        )
        .route("/webhooks/:id/test", post(subscriptions::test_webhook_handler))
        // Event type catalog
        .route("/webhooks/event-types", get(subscriptions::list_event_types_handler))
        // Delivery history
        .route(
            "/webhooks/:id/deliveries",
            get(deliveries::list_deliveries_handler),
        )
        .route(
            "/webhooks/:id/deliveries/:delivery_id",
            get(deliveries::get_delivery_handler),
        )
        // Integrations
        .route(
            "/integrations",
            post(integrations::create_integration_handler)
                .get(integrations::list_integrations_handler),
        )
        .route("/integrations/:id", get(integrations::get_integration_handler))
        .route(
            "/integrations/:id/sync",
            post(integrations::trigger_sync_handler),
        )
        .layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit_middleware,
        ))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .route("/health", get(health::health_handler))
        .merge(protected)
        .with_state(state)
}
