//! Retry sweep worker.
//!
//! Background worker that periodically claims due retries from the database
//! and re-attempts delivery. Scheduling is durable: a failed attempt
//! persists RETRYING with `next_retry_at`, and any worker instance (after a
//! restart included) picks it up once it is due. Claims use
//! FOR UPDATE SKIP LOCKED, so multiple instances never double-deliver.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::time::interval;
use tracing::{error, info};

use crate::config::WorkerSettings;
use crate::services::DeliveryService;
use crate::store::WebhookDelivery;

/// Background worker sweeping due delivery retries.
pub struct DeliveryWorker {
    delivery: DeliveryService,
    settings: WorkerSettings,
    shutdown: Arc<AtomicBool>,
}

impl DeliveryWorker {
    pub fn new(delivery: DeliveryService, settings: WorkerSettings) -> Self {
        Self {
            delivery,
            settings,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Run the sweep loop until shutdown is requested.
    pub async fn run(&self) {
        info!(
            target: "webhook_delivery",
            concurrency = self.settings.concurrency,
            poll_interval_ms = self.settings.poll_interval_ms,
            batch_size = self.settings.batch_size,
            "Starting delivery retry worker"
        );

        let semaphore = Arc::new(Semaphore::new(self.settings.concurrency));
        let mut poll_interval = interval(Duration::from_millis(self.settings.poll_interval_ms));

        loop {
            poll_interval.tick().await;
            if self.shutdown.load(Ordering::Relaxed) {
                info!(target: "webhook_delivery", "Worker shutdown requested, stopping sweep loop");
                break;
            }
            self.sweep(&semaphore).await;
        }

        // Wait for in-flight attempts to finish.
        info!(target: "webhook_delivery", "Waiting for in-flight deliveries to complete");
        let _ = semaphore
            .acquire_many(self.settings.concurrency as u32)
            .await;
        info!(target: "webhook_delivery", "Worker stopped");
    }

    /// Request graceful shutdown.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }

    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }

    /// Claim one batch of due retries and process them concurrently.
    async fn sweep(&self, semaphore: &Arc<Semaphore>) {
        let due = match WebhookDelivery::claim_due(
            self.delivery.pool(),
            self.settings.batch_size,
        )
        .await
        {
            Ok(due) => due,
            Err(e) => {
                error!(
                    target: "webhook_delivery",
                    error = %e,
                    "Failed to claim due retries"
                );
                return;
            }
        };

        if due.is_empty() {
            return;
        }

        info!(
            target: "webhook_delivery",
            count = due.len(),
            "Claimed due retries"
        );

        for delivery in due {
            let permit = match semaphore.clone().acquire_owned().await {
                Ok(permit) => permit,
                // Semaphore closed only during teardown.
                Err(_) => return,
            };
            let service = self.delivery.clone();
            tokio::spawn(async move {
                service.process_due(&delivery).await;
                drop(permit);
            });
        }
    }
}
