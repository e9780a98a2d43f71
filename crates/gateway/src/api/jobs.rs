//! Job inspection and lifecycle endpoints.
//!
//! - `GET  /v1/jobs`                     — list with filters
//! - `GET  /v1/jobs/:id`                 — single job
//! - `POST /v1/jobs/:id/acknowledge`     — idempotent ack
//! - `GET  /v1/jobs/:id/events`          — SSE stream of job events
//! - `GET  /v1/sessions/:id/jobs/active` — recovery path after a disconnect

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Json};
use serde::Deserialize;

use crate::runtime::jobs::{AckOutcome, JobStatus};
use crate::runtime::relay;
use crate::state::AppState;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// GET /v1/jobs
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
pub struct ListJobsQuery {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub offset: usize,
}

fn default_limit() -> usize {
    50
}

pub async fn list_jobs(
    State(state): State<AppState>,
    Query(q): Query<ListJobsQuery>,
) -> impl IntoResponse {
    let status = q.status.as_deref().and_then(parse_status);
    let limit = q.limit.min(200);

    let (jobs, total) = state
        .jobs
        .list(status, q.session_id.as_deref(), limit, q.offset);

    // Lightweight list view: previews instead of full payloads.
    let items: Vec<serde_json::Value> = jobs
        .iter()
        .map(|j| {
            serde_json::json!({
                "job_id": j.job_id,
                "session_id": j.session_id,
                "status": j.status,
                "created_at": j.created_at,
                "started_at": j.started_at,
                "completed_at": j.completed_at,
                "duration_ms": j.duration_ms,
                "input_preview": j.input_preview,
                "error": j.error,
                "acknowledged": j.is_acknowledged(),
            })
        })
        .collect();

    Json(serde_json::json!({
        "jobs": items,
        "total": total,
        "limit": limit,
        "offset": q.offset,
    }))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// GET /v1/jobs/:id
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<uuid::Uuid>,
) -> impl IntoResponse {
    match state.jobs.get(&job_id) {
        Some(job) => Json(serde_json::json!(job)).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": "job not found" })),
        )
            .into_response(),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// GET /v1/sessions/:id/jobs/active
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The job a reconnecting client should resume: in-flight first, else
/// finished-but-unacknowledged, else `null`.
pub async fn active_job(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> impl IntoResponse {
    Json(serde_json::json!(state.jobs.get_active(&session_id)))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /v1/jobs/:id/acknowledge
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn acknowledge_job(
    State(state): State<AppState>,
    Path(job_id): Path<uuid::Uuid>,
) -> impl IntoResponse {
    match state.jobs.acknowledge(&job_id) {
        AckOutcome::Acknowledged(job) => Json(serde_json::json!({
            "job": job,
            "already_acknowledged": false,
        }))
        .into_response(),
        AckOutcome::AlreadyAcknowledged(job) => Json(serde_json::json!({
            "job": job,
            "already_acknowledged": true,
        }))
        .into_response(),
        AckOutcome::NotTerminal(status) => (
            StatusCode::CONFLICT,
            Json(serde_json::json!({
                "error": format!("job is still {}", status.as_str()),
            })),
        )
            .into_response(),
        AckOutcome::NotFound => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": "job not found" })),
        )
            .into_response(),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// GET /v1/jobs/:id/events (SSE)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn job_events_sse(
    State(state): State<AppState>,
    Path(job_id): Path<uuid::Uuid>,
) -> impl IntoResponse {
    if state.jobs.get(&job_id).is_none() {
        let stream = futures_util::stream::once(async {
            Ok::<_, std::convert::Infallible>(
                Event::default()
                    .event("error")
                    .data(r#"{"error":"job not found"}"#),
            )
        });
        return Sse::new(stream)
            .keep_alive(KeepAlive::default())
            .into_response();
    }

    // Terminal jobs short-circuit inside the relay with a single `done`
    // snapshot; live ones stream until their own `done`.
    let rx = state.jobs.subscribe(&job_id);
    let stream = relay::job_event_stream(state.jobs.clone(), job_id, rx);

    Sse::new(stream)
        .keep_alive(KeepAlive::default())
        .into_response()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn parse_status(s: &str) -> Option<JobStatus> {
    match s {
        "pending" => Some(JobStatus::Pending),
        "running" => Some(JobStatus::Running),
        "complete" => Some(JobStatus::Complete),
        "failed" => Some(JobStatus::Failed),
        _ => None,
    }
}
