//! Sliding-window rate limiting for API endpoints.
//!
//! Tracks request timestamps per caller in memory. A request is allowed when
//! fewer than `max_requests` landed inside the trailing window; otherwise the
//! caller receives 429 with a `Retry-After` hint.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;

use crate::auth::JwtClaims;
use crate::error::WebhookError;
use crate::router::AppState;

/// Default budget: 1000 requests per 60-second window.
pub const DEFAULT_MAX_REQUESTS: usize = 1000;
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(60);

/// How often the background task drops idle caller entries.
pub const PRUNE_INTERVAL: Duration = Duration::from_secs(300);

/// In-memory sliding-window limiter keyed by caller identity.
pub struct SlidingWindowLimiter {
    max_requests: usize,
    window: Duration,
    requests: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl Default for SlidingWindowLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_REQUESTS, DEFAULT_WINDOW)
    }
}

impl SlidingWindowLimiter {
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            requests: Mutex::new(HashMap::new()),
        }
    }

    /// Record a request for `key`, or reject it with the seconds until the
    /// oldest in-window request expires.
    pub fn check(&self, key: &str) -> Result<(), u64> {
        self.check_at(key, Instant::now())
    }

    fn check_at(&self, key: &str, now: Instant) -> Result<(), u64> {
        let mut requests = match self.requests.lock() {
            Ok(guard) => guard,
            // A panic mid-update leaves at most one stale entry; keep going.
            Err(poisoned) => poisoned.into_inner(),
        };

        let timestamps = requests.entry(key.to_string()).or_default();

        // Drop entries that slid out of the window.
        while let Some(front) = timestamps.front() {
            if now.duration_since(*front) >= self.window {
                timestamps.pop_front();
            } else {
                break;
            }
        }

        if timestamps.len() >= self.max_requests {
            let oldest = timestamps
                .front()
                .copied()
                .unwrap_or(now);
            let elapsed = now.duration_since(oldest);
            let retry_after = self.window.saturating_sub(elapsed).as_secs().max(1);
            return Err(retry_after);
        }

        timestamps.push_back(now);
        Ok(())
    }

    /// Drop keys whose entire history slid out of the window.
    ///
    /// `check` trims per-key timestamps but never removes the key itself, so
    /// identities that stop calling would otherwise accumulate forever.
    pub fn prune(&self) {
        let now = Instant::now();
        if let Ok(mut requests) = self.requests.lock() {
            requests.retain(|_, timestamps| {
                timestamps
                    .back()
                    .is_some_and(|last| now.duration_since(*last) < self.window)
            });
        }
    }

    /// Spawn a background task that prunes idle entries every `every`.
    ///
    /// The returned handle can be aborted at shutdown.
    pub fn spawn_prune_task(self: Arc<Self>, every: Duration) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(every);
            loop {
                tick.tick().await;
                self.prune();
            }
        })
    }
}

/// Middleware enforcing the per-caller request budget.
///
/// Runs inside the auth layer, so every request that reaches it carries
/// verified claims; the budget is keyed on the token subject.
pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, WebhookError> {
    let key = request
        .extensions()
        .get::<JwtClaims>()
        .map(|claims| claims.sub.clone())
        .ok_or(WebhookError::Unauthorized)?;

    state
        .rate_limiter
        .check(&key)
        .map_err(|retry_after_secs| WebhookError::RateLimited { retry_after_secs })?;

    Ok(next.run(request).await)
}
