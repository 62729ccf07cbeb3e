//! Webhook delivery service for asset-tracking domain events.
//!
//! Provides tenant-scoped webhook subscription management, signed HTTP
//! delivery with per-subscription exponential backoff retries, a durable
//! sweep-based retry worker, and delivery tracking.

pub mod auth;
pub mod config;
pub mod crypto;
pub mod error;
pub mod handlers;
pub mod models;
pub mod rate_limit;
pub mod retry;
pub mod router;
pub mod services;
pub mod store;
pub mod validation;
pub mod worker;

pub use error::WebhookError;
pub use models::{DeliveryStatus, WebhookEvent, WebhookEventType};
pub use retry::RetryPolicy;
pub use router::{api_router, AppState};
pub use worker::DeliveryWorker;
