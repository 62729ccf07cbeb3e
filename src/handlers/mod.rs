//! HTTP handlers for the webhook API.

pub mod deliveries;
pub mod health;
pub mod integrations;
pub mod subscriptions;
