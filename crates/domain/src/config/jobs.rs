use serde::{Deserialize, Serialize};
use std::path::PathBuf;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Job engine
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobsConfig {
    /// Append-only JSONL log of job records; replayed on startup so
    /// terminal-but-unacknowledged jobs survive a restart.
    #[serde(default = "d_log_file")]
    pub log_file: PathBuf,
    /// Jobs kept in the in-memory ring; the oldest fall off the front.
    #[serde(default = "d_2000")]
    pub max_in_memory: usize,
    /// Hard ceiling on one turn's execution, in seconds. On expiry the
    /// job fails and the session accepts new turns again. 0 disables.
    #[serde(default = "d_300")]
    pub turn_timeout_secs: u64,
    /// How often the background sweep looks for acknowledged jobs to drop.
    #[serde(default = "d_60")]
    pub gc_interval_secs: u64,
    /// Acknowledged jobs older than this many minutes are garbage-collected.
    #[serde(default = "d_30")]
    pub acknowledged_ttl_minutes: u64,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            log_file: d_log_file(),
            max_in_memory: 2000,
            turn_timeout_secs: 300,
            gc_interval_secs: 60,
            acknowledged_ttl_minutes: 30,
        }
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_log_file() -> PathBuf {
    PathBuf::from("data/jobs.jsonl")
}
fn d_2000() -> usize {
    2000
}
fn d_300() -> u64 {
    300
}
fn d_60() -> u64 {
    60
}
fn d_30() -> u64 {
    30
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jobs_empty_toml_uses_all_defaults() {
        let cfg: JobsConfig = toml::from_str("").unwrap();
        assert_eq!(cfg.log_file, PathBuf::from("data/jobs.jsonl"));
        assert_eq!(cfg.max_in_memory, 2000);
        assert_eq!(cfg.turn_timeout_secs, 300);
        assert_eq!(cfg.gc_interval_secs, 60);
        assert_eq!(cfg.acknowledged_ttl_minutes, 30);
    }

    #[test]
    fn jobs_timeout_can_be_disabled() {
        let cfg: JobsConfig = toml::from_str("turn_timeout_secs = 0").unwrap();
        assert_eq!(cfg.turn_timeout_secs, 0);
    }
}
