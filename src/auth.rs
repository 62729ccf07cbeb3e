//! Bearer-token authentication for API endpoints.
//!
//! Tokens are HS256 JWTs carrying the subject, tenant id, and roles. The
//! middleware verifies the token and inserts the claims as a request
//! extension for handlers to consume.

use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::Response;
use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::WebhookError;
use crate::router::AppState;

/// JWT claims for API access tokens.
///
/// - `sub`: subject (user or service account id)
/// - `tid`: tenant id for multi-tenant isolation
/// - `roles`: role names for authorization
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtClaims {
    pub sub: String,
    pub tid: Option<Uuid>,
    #[serde(default)]
    pub roles: Vec<String>,
    pub exp: i64,
    pub iat: i64,
}

impl JwtClaims {
    pub fn new(sub: impl Into<String>, tenant_id: Uuid) -> Self {
        let now = Utc::now().timestamp();
        Self {
            sub: sub.into(),
            tid: Some(tenant_id),
            roles: Vec::new(),
            exp: now + 3600,
            iat: now,
        }
    }

    pub fn with_roles(mut self, roles: Vec<String>) -> Self {
        self.roles = roles;
        self
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    /// Tenant id for the request, or 403 when the token has none.
    pub fn tenant_id(&self) -> Result<Uuid, WebhookError> {
        self.tid.ok_or(WebhookError::Forbidden)
    }
}

/// Encode claims into a signed HS256 token.
pub fn encode_token(claims: &JwtClaims, secret: &str) -> Result<String, WebhookError> {
    encode(
        &Header::new(Algorithm::HS256),
        claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| WebhookError::Internal(format!("Token encoding failed: {e}")))
}

/// Decode and verify an HS256 token.
pub fn decode_token(token: &str, secret: &str) -> Result<JwtClaims, WebhookError> {
    let validation = Validation::new(Algorithm::HS256);
    decode::<JwtClaims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .map(|data| data.claims)
    .map_err(|_| WebhookError::Unauthorized)
}

/// Middleware verifying the `Authorization: Bearer <token>` header.
///
/// On success the verified [`JwtClaims`] are inserted as a request extension.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, WebhookError> {
    let token = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or(WebhookError::Unauthorized)?;

    let claims = decode_token(token, &state.config.jwt_secret)?;

    request.extensions_mut().insert(claims);
    Ok(next.run(request).await)
}
