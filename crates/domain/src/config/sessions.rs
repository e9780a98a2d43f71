use serde::{Deserialize, Serialize};
use std::path::PathBuf;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Session state
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Durable session state: where it lives on disk, when a session counts
/// as stale, and how large the warm cache may grow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionsConfig {
    /// Directory holding one JSON state file per session.
    #[serde(default = "d_state_dir")]
    pub state_dir: PathBuf,
    /// Wall-clock minutes since the last successful commit after which a
    /// session reads as stale. Reads still succeed; the caller decides
    /// whether to resume or start fresh.
    #[serde(default = "d_240")]
    pub stale_after_minutes: u64,
    /// Sessions kept in the in-memory cache; least recently committed
    /// entries are evicted first. Evicted sessions reload from disk.
    #[serde(default = "d_256")]
    pub cache_max_entries: usize,
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            state_dir: d_state_dir(),
            stale_after_minutes: 240,
            cache_max_entries: 256,
        }
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_state_dir() -> PathBuf {
    PathBuf::from("data/sessions")
}
fn d_240() -> u64 {
    240
}
fn d_256() -> usize {
    256
}
