//! Turn submission endpoint.
//!
//! `POST /v1/sessions/:id/turns` — accept one user message and return
//! the job handle immediately (202). The turn runs detached; progress
//! arrives over `GET /v1/jobs/:id/events` or by polling the job.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use serde::Deserialize;

use cs_domain::error::Error;

use crate::runtime::jobs::TurnRequest;
use crate::runtime::turn;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SubmitTurnBody {
    pub user_text: String,
}

pub async fn submit_turn(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(body): Json<SubmitTurnBody>,
) -> impl IntoResponse {
    if body.user_text.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "error": "user_text must not be empty" })),
        )
            .into_response();
    }

    match turn::submit_turn(
        &state,
        TurnRequest {
            session_id,
            user_text: body.user_text,
        },
    ) {
        Ok(job) => (StatusCode::ACCEPTED, Json(serde_json::json!(job))).into_response(),
        Err(Error::SessionBusy { session_id }) => (
            StatusCode::TOO_MANY_REQUESTS,
            Json(serde_json::json!({
                "error": "a turn is already in progress for this session",
                "session_id": session_id,
            })),
        )
            .into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({ "error": e.to_string() })),
        )
            .into_response(),
    }
}
