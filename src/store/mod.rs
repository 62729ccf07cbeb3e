//! Persistence layer: one model per file, CRUD as associated functions.

pub mod delivery;
pub mod integration;
pub mod subscription;

pub use delivery::{CreateWebhookDelivery, WebhookDelivery};
pub use integration::{CreateIntegration, Integration, IntegrationSyncRun, SyncStats};
pub use subscription::{CreateWebhookSubscription, UpdateWebhookSubscription, WebhookSubscription};
