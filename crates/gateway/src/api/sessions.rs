//! Session introspection and lifecycle endpoints.
//!
//! - `GET    /v1/sessions`             — overview list, most recent first
//! - `GET    /v1/sessions/:id/status`  — activity status plus a preview
//! - `GET    /v1/sessions/:id/context` — tier partition and projection
//! - `DELETE /v1/sessions/:id`         — forget the session everywhere

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};

use cs_registry::{classify, Verbosity};
use cs_sessions::SessionStatus;

use crate::runtime::truncate_str;
use crate::state::AppState;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// GET /v1/sessions
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn list_sessions(State(state): State<AppState>) -> impl IntoResponse {
    match state.sessions.list_overviews().await {
        Ok(overviews) => Json(serde_json::json!({
            "sessions": overviews,
            "total": overviews.len(),
        }))
        .into_response(),
        Err(e) => internal_error(e),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// GET /v1/sessions/:id/status
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn session_status(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> impl IntoResponse {
    let status = match state.sessions.status(&session_id).await {
        Ok(s) => s,
        Err(e) => return internal_error(e),
    };
    if status == SessionStatus::None {
        return Json(serde_json::json!({
            "session_id": session_id,
            "status": status,
            "last_active_at": null,
            "preview": null,
        }))
        .into_response();
    }

    // Second lookup hits the cache the status check just warmed.
    match state.sessions.load(&session_id).await {
        Ok(Some(session)) => {
            let last_message = session
                .history
                .turns()
                .iter()
                .rev()
                .find(|t| !t.compressed)
                .map(|t| truncate_str(&t.user_text, 120));
            Json(serde_json::json!({
                "session_id": session.session_id,
                "status": status,
                "last_active_at": session.last_active_at,
                "preview": {
                    "last_message": last_message,
                    "message_count": session.history.turn_count(),
                },
            }))
            .into_response()
        }
        Ok(None) => Json(serde_json::json!({
            "session_id": session_id,
            "status": SessionStatus::None,
            "last_active_at": null,
            "preview": null,
        }))
        .into_response(),
        Err(e) => internal_error(e),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// GET /v1/sessions/:id/context
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// What the reasoner would see if a turn ran right now: the tier
/// partition, the formatted projection, and the standing facts.
pub async fn session_context(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> impl IntoResponse {
    match state.sessions.load(&session_id).await {
        Ok(Some(session)) => {
            let current_turn = session.next_turn_index();
            let tiers = classify(&session.entities, current_turn, &state.config.context);
            let formatted = session.entities.format_for_consumer(&tiers, Verbosity::Full);
            let constraints: Vec<serde_json::Value> = session
                .constraints_at(current_turn)
                .iter()
                .map(|(name, c)| {
                    serde_json::json!({
                        "name": name,
                        "value": c.value,
                        "source_turn": c.source_turn,
                        "expires_at_turn": c.expires_at_turn,
                    })
                })
                .collect();

            Json(serde_json::json!({
                "session_id": session.session_id,
                "turn_count": session.history.turn_count(),
                "entity_count": session.entities.len(),
                "tiers": tiers,
                "formatted": formatted,
                "constraints": constraints,
                "pending_confirmation": session.pending_confirmation,
                "history_summary": session.history.summary(),
            }))
            .into_response()
        }
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": "session not found" })),
        )
            .into_response(),
        Err(e) => internal_error(e),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// DELETE /v1/sessions/:id
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn reset_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> impl IntoResponse {
    match state.sessions.reset(&session_id).await {
        Ok(()) => Json(serde_json::json!({
            "session_id": session_id,
            "reset": true,
        }))
        .into_response(),
        Err(e) => internal_error(e),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn internal_error(e: cs_domain::error::Error) -> axum::response::Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(serde_json::json!({ "error": e.to_string() })),
    )
        .into_response()
}
