use axum::Json;
use serde_json::{json, Value};

/// GET / and GET /health
pub async fn health_handler() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "message": "Tempo scheduler API is running",
        "version": tempo_core::VERSION,
    }))
}
