use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Context tiers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Controls how session entities are partitioned into context tiers
/// before a turn is handed to the reasoner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    /// An entity referenced within the last N turns counts as active.
    /// Touched at turn `t`, it stays active through turn `t + N`.
    #[serde(default = "d_2")]
    pub active_window_turns: u32,
    /// Hard cap on entities included in the formatted projection; the
    /// oldest dormant entries are elided first.
    #[serde(default = "d_200")]
    pub max_projected_entities: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            active_window_turns: 2,
            max_projected_entities: 200,
        }
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_2() -> u32 {
    2
}
fn d_200() -> usize {
    200
}
