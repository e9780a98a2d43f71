use std::sync::Arc;

use cs_collab::{Summarizer, TurnReasoner};
use cs_domain::config::Config;
use cs_sessions::SessionStateStore;

use crate::runtime::admission::SessionGate;
use crate::runtime::jobs::JobStore;

/// Shared application state passed to all API handlers.
///
/// Fields are grouped by concern:
/// - **Core services** — config, collaborator clients
/// - **Session state** — the cache-fronted durable store
/// - **Runtime** — job tracking and per-session admission
#[derive(Clone)]
pub struct AppState {
    // ── Core services ─────────────────────────────────────────────────
    pub config: Arc<Config>,
    /// Reasoning collaborator deciding each turn.
    pub reasoner: Arc<dyn TurnReasoner>,
    /// Summarization collaborator for history compression.
    pub summarizer: Arc<dyn Summarizer>,

    // ── Session state ─────────────────────────────────────────────────
    pub sessions: Arc<SessionStateStore>,

    // ── Runtime ───────────────────────────────────────────────────────
    /// Job execution tracker.
    pub jobs: Arc<JobStore>,
    /// Per-session admission gate (one turn in flight per session).
    pub gate: Arc<SessionGate>,
}
