use axum::{extract::State, Json};
use serde_json::{json, Value};

use crate::state::AppState;

/// GET /health
/// Returns service status, version, index size, and the number of live sessions.
pub async fn health_handler(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "service": "coach-api",
        "embedder": state.embedder.name(),
        "roles": state.index.roles().len(),
        "competencies": state.index.entry_count(),
        "active_sessions": state.sessions.len().await,
    }))
}
