//! Liveness probe.

use axum::extract::State;
use axum::response::{IntoResponse, Json};

use crate::state::AppState;

/// GET /v1/health — liveness plus a few cheap gauges.
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "sessions_cached": state.sessions.cached_sessions(),
        "sessions_busy": state.gate.session_count(),
        "jobs": state.jobs.status_counts(),
    }))
}
