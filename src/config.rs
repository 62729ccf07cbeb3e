//! Service configuration loaded from environment variables.

use std::env;
use std::net::SocketAddr;

/// Configuration error variants.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {var}")]
    Missing { var: String },

    #[error("Invalid value for {var}: {reason}")]
    Invalid { var: String, reason: String },
}

/// Root service configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Postgres connection string.
    pub database_url: String,
    /// Address the HTTP server binds to.
    pub listen_addr: SocketAddr,
    /// Production mode enables strict URL/SSRF validation.
    pub production: bool,
    /// Shared secret for HS256 bearer tokens.
    pub jwt_secret: String,
    /// 32-byte key for encrypting webhook secrets at rest (hex-encoded in env).
    pub encryption_key: Vec<u8>,
    /// Retry worker settings.
    pub worker: WorkerSettings,
}

/// Retry worker tuning knobs.
#[derive(Debug, Clone)]
pub struct WorkerSettings {
    /// How often to sweep for due retries (milliseconds).
    pub poll_interval_ms: u64,
    /// Maximum deliveries claimed per sweep.
    pub batch_size: i64,
    /// Concurrent in-flight delivery attempts.
    pub concurrency: usize,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,
            batch_size: 20,
            concurrency: 8,
        }
    }
}

impl AppConfig {
    /// Load configuration from the environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = require("DATABASE_URL")?;

        let listen_addr = env::var("LISTEN_ADDR")
            .unwrap_or_else(|_| "0.0.0.0:8080".to_string())
            .parse()
            .map_err(|e| ConfigError::Invalid {
                var: "LISTEN_ADDR".to_string(),
                reason: format!("{e}"),
            })?;

        let production = env::var("APP_ENV")
            .map(|v| v.eq_ignore_ascii_case("production"))
            .unwrap_or(false);

        let jwt_secret = require("JWT_SECRET")?;

        let encryption_key = decode_key(&require("WEBHOOK_ENCRYPTION_KEY")?)?;

        let worker = WorkerSettings {
            poll_interval_ms: parse_or("WORKER_POLL_INTERVAL_MS", 1000)?,
            batch_size: parse_or("WORKER_BATCH_SIZE", 20)?,
            concurrency: parse_or("WORKER_CONCURRENCY", 8)?,
        };

        Ok(Self {
            database_url,
            listen_addr,
            production,
            jwt_secret,
            encryption_key,
            worker,
        })
    }
}

fn require(var: &str) -> Result<String, ConfigError> {
    env::var(var).map_err(|_| ConfigError::Missing {
        var: var.to_string(),
    })
}

fn parse_or<T: std::str::FromStr>(var: &str, default: T) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match env::var(var) {
        Ok(raw) => raw.parse().map_err(|e: T::Err| ConfigError::Invalid {
            var: var.to_string(),
            reason: format!("{e}"),
        }),
        Err(_) => Ok(default),
    }
}

/// Decode a hex-encoded 32-byte AES key.
fn decode_key(raw: &str) -> Result<Vec<u8>, ConfigError> {
    let key = hex::decode(raw).map_err(|e| ConfigError::Invalid {
        var: "WEBHOOK_ENCRYPTION_KEY".to_string(),
        reason: format!("not valid hex: {e}"),
    })?;

    if key.len() != 32 {
        return Err(ConfigError::Invalid {
            var: "WEBHOOK_ENCRYPTION_KEY".to_string(),
            reason: format!("expected 32 bytes, got {}", key.len()),
        });
    }

    Ok(key)
}
