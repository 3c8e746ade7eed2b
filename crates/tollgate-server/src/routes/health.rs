use axum::Json;
use serde_json::{Value, json};

/// Liveness check. Does not touch the store.
pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok", "service": "tollgate" }))
}
