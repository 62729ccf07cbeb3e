//! Service layer: business logic between handlers/worker and the store.

pub mod delivery_service;
pub mod integration_service;
pub mod subscription_service;

pub use delivery_service::{AttemptOutcome, DeliveryService};
pub use integration_service::IntegrationService;
pub use subscription_service::SubscriptionService;
