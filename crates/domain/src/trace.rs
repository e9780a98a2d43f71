use serde::Serialize;

/// Structured trace events emitted across all Callsign crates.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum TraceEvent {
    RefTranslationMiss {
        session_id: String,
        ref_token: String,
    },
    CurationApplied {
        session_id: String,
        retained: usize,
        demoted: usize,
        dropped: usize,
        cleared_all: bool,
        unknown_refs: usize,
    },
    HistoryCompressed {
        session_id: String,
        folded_turns: usize,
        summary_chars: usize,
        duration_ms: u64,
    },
    HistoryCompressionSkipped {
        session_id: String,
        reason: String,
    },
    SessionCommitted {
        session_id: String,
        turn_count: usize,
        entity_count: usize,
        duration_ms: u64,
    },
    SessionLoaded {
        session_id: String,
        source: String,
        turn_count: usize,
    },
    JobAdmitted {
        job_id: String,
        session_id: String,
    },
    JobRejected {
        session_id: String,
    },
    JobFinished {
        job_id: String,
        session_id: String,
        status: String,
        duration_ms: u64,
    },
    JobAcknowledged {
        job_id: String,
        already_acknowledged: bool,
    },
    CollaboratorCall {
        endpoint: String,
        status: u16,
        duration_ms: u64,
    },
    RelayLagged {
        job_id: String,
        skipped: u64,
    },
}

impl TraceEvent {
    pub fn emit(&self) {
        let json = serde_json::to_string(self).unwrap_or_default();
        tracing::info!(trace_event = %json, "cs_event");
    }
}
