use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Turn history compression
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Compression folds old turns into a narrative summary so a session
/// survives arbitrarily many turns without the reasoning context growing
/// without bound.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// Run compression automatically when turn count exceeds
    /// `compress_after_turns`.
    #[serde(default = "d_true")]
    pub auto: bool,
    /// Turn count above which compression triggers.
    #[serde(default = "d_30")]
    pub compress_after_turns: usize,
    /// Number of recent turns kept verbatim; everything older is folded
    /// into the summary.
    #[serde(default = "d_8")]
    pub keep_recent: usize,
    /// Cap on the transcript text handed to the summarizer in one call.
    #[serde(default = "d_24000")]
    pub summary_input_max_chars: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            auto: true,
            compress_after_turns: 30,
            keep_recent: 8,
            summary_input_max_chars: 24_000,
        }
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_true() -> bool {
    true
}
fn d_30() -> usize {
    30
}
fn d_8() -> usize {
    8
}
fn d_24000() -> usize {
    24_000
}
