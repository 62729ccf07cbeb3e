//! End-to-end tests for the persisted delivery state machine.
//!
//! These need a running Postgres (`DATABASE_URL`) and are gated behind the
//! `integration` feature:
//!
//! ```sh
//! cargo test --features integration
//! ```

#![cfg(feature = "integration")]

mod common;

use common::*;
use chrono::{Duration, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use uuid::Uuid;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer};

use assettrack_webhooks::crypto;
use assettrack_webhooks::models::{WebhookEvent, WebhookEventType};
use assettrack_webhooks::retry::RetryPolicy;
use assettrack_webhooks::services::{DeliveryService, SubscriptionService};
use assettrack_webhooks::store::{
    CreateIntegration, CreateWebhookSubscription, Integration, WebhookDelivery,
    WebhookSubscription,
};

async fn setup_pool() -> PgPool {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&url)
        .await
        .expect("connect to test database");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("run migrations");
    pool
}

fn delivery_service(pool: &PgPool) -> DeliveryService {
    DeliveryService::new(pool.clone(), test_encryption_key()).expect("service builds")
}

async fn create_subscription(
    pool: &PgPool,
    tenant_id: Uuid,
    url: &str,
    policy: RetryPolicy,
) -> WebhookSubscription {
    let secret_encrypted =
        crypto::encrypt_secret(SECRET_1, &test_encryption_key()).expect("encrypt");
    WebhookSubscription::create(
        pool,
        CreateWebhookSubscription {
            tenant_id,
            name: "test-endpoint".to_string(),
            url: url.to_string(),
            events: vec!["asset.created".to_string()],
            secret_encrypted: Some(secret_encrypted),
            retry_policy: policy,
        },
    )
    .await
    .expect("create subscription")
}

async fn latest_delivery(pool: &PgPool, tenant_id: Uuid, webhook_id: Uuid) -> WebhookDelivery {
    WebhookDelivery::list_by_webhook(pool, tenant_id, webhook_id, None, 10, 0)
        .await
        .expect("list deliveries")
        .into_iter()
        .next()
        .expect("delivery row exists")
}

fn asset_created(tenant_id: Uuid) -> WebhookEvent {
    WebhookEvent::new(
        WebhookEventType::AssetCreated,
        tenant_id,
        serde_json::json!({"asset_id": "laptop-042"}),
    )
}

#[tokio::test]
async fn test_successful_delivery_finalizes_as_delivered() {
    let pool = setup_pool().await;
    let tenant_id = Uuid::new_v4();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(CaptureResponder::new().with_body("received"))
        .mount(&server)
        .await;

    let sub = create_subscription(&pool, tenant_id, &server.uri(), RetryPolicy::default()).await;
    delivery_service(&pool).deliver_event(&asset_created(tenant_id)).await;

    let delivery = latest_delivery(&pool, tenant_id, sub.id).await;
    assert_eq!(delivery.status, "DELIVERED");
    assert_eq!(delivery.attempt_number, 1);
    assert_eq!(delivery.response_code, Some(200));
    assert_eq!(delivery.response_body.as_deref(), Some("received"));
    assert!(delivery.delivered_at.is_some());
    assert!(delivery.next_retry_at.is_none());
}

#[tokio::test]
async fn test_failed_delivery_schedules_retry() {
    let pool = setup_pool().await;
    let tenant_id = Uuid::new_v4();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(CaptureResponder::with_status(500))
        .mount(&server)
        .await;

    let sub = create_subscription(&pool, tenant_id, &server.uri(), RetryPolicy::default()).await;
    delivery_service(&pool).deliver_event(&asset_created(tenant_id)).await;

    let delivery = latest_delivery(&pool, tenant_id, sub.id).await;
    assert_eq!(delivery.status, "RETRYING");
    assert_eq!(delivery.attempt_number, 1);
    assert_eq!(delivery.response_code, Some(500));
    let next = delivery.next_retry_at.expect("retry scheduled");
    // Default policy: first retry ~1s out.
    assert!(next > Utc::now() - Duration::seconds(1));
    assert!(next < Utc::now() + Duration::seconds(30));
}

#[tokio::test]
async fn test_single_attempt_policy_exhausts_immediately() {
    let pool = setup_pool().await;
    let tenant_id = Uuid::new_v4();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(CaptureResponder::with_status(503))
        .mount(&server)
        .await;

    let policy = RetryPolicy {
        max_attempts: 1,
        ..RetryPolicy::default()
    };
    let sub = create_subscription(&pool, tenant_id, &server.uri(), policy).await;
    delivery_service(&pool).deliver_event(&asset_created(tenant_id)).await;

    let delivery = latest_delivery(&pool, tenant_id, sub.id).await;
    assert_eq!(delivery.status, "EXHAUSTED");
    assert!(delivery.next_retry_at.is_none());
}

#[tokio::test]
async fn test_persistent_500_exhausts_after_max_attempts() {
    let pool = setup_pool().await;
    let tenant_id = Uuid::new_v4();
    let server = MockServer::start().await;
    let capture = CaptureResponder::with_status(500);
    Mock::given(method("POST"))
        .respond_with(capture.clone())
        .mount(&server)
        .await;

    let policy = RetryPolicy {
        max_attempts: 3,
        ..RetryPolicy::default()
    };
    let sub = create_subscription(&pool, tenant_id, &server.uri(), policy).await;
    let service = delivery_service(&pool);
    service.deliver_event(&asset_created(tenant_id)).await;

    let delivery = latest_delivery(&pool, tenant_id, sub.id).await;
    assert_eq!(delivery.status, "RETRYING");
    assert_eq!(delivery.attempt_number, 1);

    // Drive the sweep until the budget is spent.
    for expected_attempt in 2..=3 {
        WebhookDelivery::mark_retrying(
            &pool,
            delivery.id,
            Some(500),
            None,
            Utc::now() - Duration::seconds(5),
        )
        .await
        .expect("reschedule");

        let claimed = WebhookDelivery::claim_due(&pool, 10).await.expect("claim");
        let claimed_row = claimed
            .iter()
            .find(|d| d.id == delivery.id)
            .expect("claimed");
        assert_eq!(claimed_row.attempt_number, expected_attempt);
        service.process_due(claimed_row).await;
    }

    let final_row = latest_delivery(&pool, tenant_id, sub.id).await;
    assert_eq!(final_row.status, "EXHAUSTED");
    assert_eq!(final_row.attempt_number, 3);
    assert_eq!(final_row.response_code, Some(500));
    assert!(final_row.next_retry_at.is_none());
    // The endpoint saw exactly one request per attempt.
    assert_eq!(capture.request_count(), 3);
}

#[tokio::test]
async fn test_claim_due_increments_attempt_and_leases() {
    let pool = setup_pool().await;
    let tenant_id = Uuid::new_v4();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(CaptureResponder::with_status(500))
        .mount(&server)
        .await;

    let sub = create_subscription(&pool, tenant_id, &server.uri(), RetryPolicy::default()).await;
    delivery_service(&pool).deliver_event(&asset_created(tenant_id)).await;

    let delivery = latest_delivery(&pool, tenant_id, sub.id).await;
    // Force the retry due now.
    WebhookDelivery::mark_retrying(
        &pool,
        delivery.id,
        Some(500),
        None,
        Utc::now() - Duration::seconds(5),
    )
    .await
    .expect("reschedule");

    let claimed = WebhookDelivery::claim_due(&pool, 10).await.expect("claim");
    let claimed_row = claimed
        .iter()
        .find(|d| d.id == delivery.id)
        .expect("our delivery claimed");

    // Attempt counter persisted before the attempt runs.
    assert_eq!(claimed_row.attempt_number, 2);
    // Lease pushes next_retry_at into the future, hiding it from other sweeps.
    assert!(claimed_row.next_retry_at.expect("lease set") > Utc::now());

    let reclaimed = WebhookDelivery::claim_due(&pool, 10).await.expect("claim");
    assert!(!reclaimed.iter().any(|d| d.id == delivery.id));
}

#[tokio::test]
async fn test_retry_succeeds_after_endpoint_recovers() {
    let pool = setup_pool().await;
    let tenant_id = Uuid::new_v4();
    let server = MockServer::start().await;
    let flaky = FlakyResponder::new(1, 500);
    Mock::given(method("POST"))
        .respond_with(flaky.clone())
        .mount(&server)
        .await;

    let sub = create_subscription(&pool, tenant_id, &server.uri(), RetryPolicy::default()).await;
    let service = delivery_service(&pool);
    service.deliver_event(&asset_created(tenant_id)).await;

    let delivery = latest_delivery(&pool, tenant_id, sub.id).await;
    assert_eq!(delivery.status, "RETRYING");

    WebhookDelivery::mark_retrying(
        &pool,
        delivery.id,
        Some(500),
        None,
        Utc::now() - Duration::seconds(5),
    )
    .await
    .expect("reschedule");

    let claimed = WebhookDelivery::claim_due(&pool, 10).await.expect("claim");
    let claimed_row = claimed
        .iter()
        .find(|d| d.id == delivery.id)
        .expect("claimed");
    service.process_due(claimed_row).await;

    let delivery = latest_delivery(&pool, tenant_id, sub.id).await;
    assert_eq!(delivery.status, "DELIVERED");
    assert_eq!(delivery.attempt_number, 2);
    assert_eq!(flaky.request_count(), 2);
}

#[tokio::test]
async fn test_retry_for_deleted_webhook_finalizes_as_failed() {
    let pool = setup_pool().await;
    let tenant_id = Uuid::new_v4();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(CaptureResponder::with_status(500))
        .mount(&server)
        .await;

    let sub = create_subscription(&pool, tenant_id, &server.uri(), RetryPolicy::default()).await;
    let service = delivery_service(&pool);
    service.deliver_event(&asset_created(tenant_id)).await;

    let delivery = latest_delivery(&pool, tenant_id, sub.id).await;
    WebhookDelivery::mark_retrying(
        &pool,
        delivery.id,
        Some(500),
        None,
        Utc::now() - Duration::seconds(5),
    )
    .await
    .expect("reschedule");

    assert!(WebhookSubscription::delete(&pool, tenant_id, sub.id)
        .await
        .expect("delete"));

    let claimed = WebhookDelivery::claim_due(&pool, 10).await.expect("claim");
    let claimed_row = claimed
        .iter()
        .find(|d| d.id == delivery.id)
        .expect("claimed");
    service.process_due(claimed_row).await;

    // History survives deletion, finalized outside the attempt loop.
    let row: WebhookDelivery =
        sqlx::query_as("SELECT * FROM webhook_deliveries WHERE id = $1")
            .bind(delivery.id)
            .fetch_one(&pool)
            .await
            .expect("row persists");
    assert_eq!(row.status, "FAILED");
    assert!(row.response_body.expect("reason recorded").contains("deleted"));
}

#[tokio::test]
async fn test_retry_for_deactivated_webhook_finalizes_as_failed() {
    let pool = setup_pool().await;
    let tenant_id = Uuid::new_v4();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(CaptureResponder::with_status(500))
        .mount(&server)
        .await;

    let sub = create_subscription(&pool, tenant_id, &server.uri(), RetryPolicy::default()).await;
    let service = delivery_service(&pool);
    service.deliver_event(&asset_created(tenant_id)).await;

    let delivery = latest_delivery(&pool, tenant_id, sub.id).await;
    WebhookDelivery::mark_retrying(
        &pool,
        delivery.id,
        Some(500),
        None,
        Utc::now() - Duration::seconds(5),
    )
    .await
    .expect("reschedule");

    sqlx::query("UPDATE webhooks SET is_active = FALSE WHERE id = $1")
        .bind(sub.id)
        .execute(&pool)
        .await
        .expect("deactivate");

    let claimed = WebhookDelivery::claim_due(&pool, 10).await.expect("claim");
    let claimed_row = claimed
        .iter()
        .find(|d| d.id == delivery.id)
        .expect("claimed");
    service.process_due(claimed_row).await;

    let delivery = latest_delivery(&pool, tenant_id, sub.id).await;
    assert_eq!(delivery.status, "FAILED");
}

#[tokio::test]
async fn test_fanout_isolates_failing_endpoint() {
    let pool = setup_pool().await;
    let tenant_id = Uuid::new_v4();

    let good_server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(CaptureResponder::new())
        .mount(&good_server)
        .await;
    let bad_server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(CaptureResponder::with_status(500))
        .mount(&bad_server)
        .await;

    let good =
        create_subscription(&pool, tenant_id, &good_server.uri(), RetryPolicy::default()).await;
    let bad =
        create_subscription(&pool, tenant_id, &bad_server.uri(), RetryPolicy::default()).await;

    delivery_service(&pool).deliver_event(&asset_created(tenant_id)).await;

    assert_eq!(latest_delivery(&pool, tenant_id, good.id).await.status, "DELIVERED");
    assert_eq!(latest_delivery(&pool, tenant_id, bad.id).await.status, "RETRYING");
}

#[tokio::test]
async fn test_events_do_not_cross_tenants() {
    let pool = setup_pool().await;
    let tenant_a = Uuid::new_v4();
    let tenant_b = Uuid::new_v4();
    let server = MockServer::start().await;
    let capture = CaptureResponder::new();
    Mock::given(method("POST"))
        .respond_with(capture.clone())
        .mount(&server)
        .await;

    let sub_b = create_subscription(&pool, tenant_b, &server.uri(), RetryPolicy::default()).await;

    // Event in tenant A must not reach tenant B's endpoint.
    delivery_service(&pool).deliver_event(&asset_created(tenant_a)).await;

    assert_eq!(capture.request_count(), 0);
    let deliveries = WebhookDelivery::list_by_webhook(&pool, tenant_b, sub_b.id, None, 10, 0)
        .await
        .expect("list");
    assert!(deliveries.is_empty());
}

#[tokio::test]
async fn test_endpoint_runs_full_delivery_path() {
    let pool = setup_pool().await;
    let tenant_id = Uuid::new_v4();
    let server = MockServer::start().await;
    let capture = CaptureResponder::new();
    Mock::given(method("POST"))
        .respond_with(capture.clone())
        .mount(&server)
        .await;

    let sub = create_subscription(&pool, tenant_id, &server.uri(), RetryPolicy::default()).await;
    let subscriptions = SubscriptionService::new(pool.clone(), test_encryption_key(), false);
    let delivery = subscriptions
        .send_test(&delivery_service(&pool), tenant_id, sub.id)
        .await
        .expect("test delivery");

    assert_eq!(delivery.event_type, "webhook.test");
    assert_eq!(delivery.status, "DELIVERED");

    let req = &capture.requests()[0];
    let body: serde_json::Value = req.body_json().expect("json body");
    assert_eq!(body["event"], "webhook.test");
    assert_eq!(body["metadata"]["test"], true);
    assert_eq!(body["data"]["message"], "This is a test webhook delivery");

    // Test deliveries are signed like real ones.
    let signature = req.header("x-webhook-signature").expect("signed");
    assert!(crypto::verify_signature(signature, SECRET_1, &req.body));
}

#[tokio::test]
async fn test_concurrent_sync_trigger_conflicts() {
    let pool = setup_pool().await;
    let tenant_id = Uuid::new_v4();

    let integration = Integration::create(
        &pool,
        CreateIntegration {
            tenant_id,
            name: "sap-erp".to_string(),
            kind: "sap".to_string(),
        },
    )
    .await
    .expect("create integration");

    let first = Integration::try_begin_sync(&pool, tenant_id, integration.id)
        .await
        .expect("begin sync");
    assert!(first.is_some());
    assert_eq!(first.unwrap().status, "SYNCING");

    // Second trigger while syncing gets nothing back.
    let second = Integration::try_begin_sync(&pool, tenant_id, integration.id)
        .await
        .expect("begin sync");
    assert!(second.is_none());

    Integration::complete_sync(&pool, integration.id, true)
        .await
        .expect("complete");
    let third = Integration::try_begin_sync(&pool, tenant_id, integration.id)
        .await
        .expect("begin sync");
    assert!(third.is_some());
}
