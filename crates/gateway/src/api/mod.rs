//! HTTP surface of the gateway.
//!
//! Opinionated and small: turn submission, job inspection with SSE, and
//! session introspection. Everything session-mutating goes through the
//! turn pipeline; the endpoints here never write state directly except
//! the explicit session reset.

pub mod health;
pub mod jobs;
pub mod sessions;
pub mod turns;

use axum::routing::{delete, get, post};
use axum::Router;

use crate::state::AppState;

/// Build the full API router.
pub fn router() -> Router<AppState> {
    Router::new()
        // Turn submission (core runtime)
        .route("/v1/sessions/:id/turns", post(turns::submit_turn))
        // Session introspection
        .route("/v1/sessions", get(sessions::list_sessions))
        .route("/v1/sessions/:id/status", get(sessions::session_status))
        .route("/v1/sessions/:id/context", get(sessions::session_context))
        .route("/v1/sessions/:id", delete(sessions::reset_session))
        .route("/v1/sessions/:id/jobs/active", get(jobs::active_job))
        // Jobs (execution tracking)
        .route("/v1/jobs", get(jobs::list_jobs))
        .route("/v1/jobs/:id", get(jobs::get_job))
        .route("/v1/jobs/:id/acknowledge", post(jobs::acknowledge_job))
        .route("/v1/jobs/:id/events", get(jobs::job_events_sse))
        // Liveness
        .route("/v1/health", get(health::health))
}
