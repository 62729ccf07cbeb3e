//! Health check handler.

use axum::{extract::State, Json};
use serde_json::{json, Value};

use crate::router::AppState;

/// Liveness/readiness probe. Reports database connectivity without failing
/// the probe itself.
pub async fn health_handler(State(state): State<AppState>) -> Json<Value> {
    let db_ok = sqlx::query("SELECT 1")
        .execute(state.pool())
        .await
        .is_ok();

    Json(json!({
        "status": if db_ok { "ok" } else { "degraded" },
        "database": db_ok,
    }))
}
