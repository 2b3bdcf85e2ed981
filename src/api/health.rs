//! Health check endpoints

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{Value, json};

use crate::AppState;

/// Liveness - always OK while the process runs
async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Readiness - verifies the database answers a probe query
async fn health_db(State(state): State<AppState>) -> Json<Value> {
    let db = if state.db.ping().await { "ok" } else { "down" };
    Json(json!({ "db": db }))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/health/db", get(health_db))
}
