//! Liveness endpoint.

use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};

use crate::state::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/health", get(health))
}

async fn health(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let limiter = state.limiter.as_ref().map(|l| {
        serde_json::json!({
            "limit": l.limit(),
            "windowSecs": l.window().length().as_secs(),
        })
    });

    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "rateLimiting": limiter,
        "jobDeadlineSecs": state.orchestrator.deadline().as_secs(),
    }))
}
