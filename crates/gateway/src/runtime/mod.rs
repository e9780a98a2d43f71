//! Core runtime — the job engine that ties admission, session state, the
//! reasoning collaborator, and persistence into one deterministic turn
//! pipeline.
//!
//! Entry point: [`turn::submit_turn`] admits a turn, records a job, and
//! spawns the detached pipeline. The caller gets the job handle back
//! immediately; progress flows through the job's broadcast channel.

pub mod admission;
pub mod jobs;
pub mod relay;
pub mod turn;

/// Truncate a string to at most `max` bytes on a char boundary, appending
/// "..." when anything was cut.
pub(crate) fn truncate_str(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut end = max;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &s[..end])
}
