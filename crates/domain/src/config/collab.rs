use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Collaborator connection
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Connection settings for the external reasoning and summarization
/// collaborators (both live behind one base URL).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollabConfig {
    #[serde(default = "d_collab_url")]
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    /// Transport timeout per request. The per-turn ceiling lives in
    /// `jobs.turn_timeout_secs`; this one only bounds a single HTTP call.
    #[serde(default = "d_30000")]
    pub timeout_ms: u64,
    /// Retries on 5xx / timeout. 4xx never retries.
    #[serde(default = "d_2")]
    pub max_retries: u32,
}

impl Default for CollabConfig {
    fn default() -> Self {
        Self {
            base_url: d_collab_url(),
            api_key: None,
            timeout_ms: 30_000,
            max_retries: 2,
        }
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_collab_url() -> String {
    "http://localhost:8750".into()
}
fn d_30000() -> u64 {
    30_000
}
fn d_2() -> u32 {
    2
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collab_empty_toml_uses_all_defaults() {
        let cfg: CollabConfig = toml::from_str("").unwrap();
        assert_eq!(cfg.base_url, "http://localhost:8750");
        assert!(cfg.api_key.is_none());
        assert_eq!(cfg.timeout_ms, 30_000);
        assert_eq!(cfg.max_retries, 2);
    }

    #[test]
    fn collab_parses_api_key() {
        let cfg: CollabConfig = toml::from_str(r#"api_key = "sk-test""#).unwrap();
        assert_eq!(cfg.api_key.as_deref(), Some("sk-test"));
    }
}
