mod collab;
mod context;
mod history;
mod jobs;
mod server;
mod sessions;

pub use collab::*;
pub use context::*;
pub use history::*;
pub use jobs::*;
pub use server::*;
pub use sessions::*;

use serde::{Deserialize, Serialize};
use std::fmt;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub context: ContextConfig,
    #[serde(default)]
    pub history: HistoryConfig,
    #[serde(default)]
    pub sessions: SessionsConfig,
    #[serde(default)]
    pub jobs: JobsConfig,
    #[serde(default)]
    pub collab: CollabConfig,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Config validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Severity level for a configuration issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

/// A single configuration validation issue.
#[derive(Debug, Clone)]
pub struct ConfigError {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}: {}", self.field, self.message)
    }
}

impl Config {
    /// Validate the configuration and return a list of issues.
    ///
    /// Returns an empty vec when everything looks good.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        // Server port must be non-zero.
        if self.server.port == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "server.port".into(),
                message: "port must be greater than 0".into(),
            });
        }

        // Server host must not be empty.
        if self.server.host.is_empty() {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "server.host".into(),
                message: "host must not be empty".into(),
            });
        }

        // Collaborator base_url must not be empty.
        if self.collab.base_url.is_empty() {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "collab.base_url".into(),
                message: "base_url must not be empty".into(),
            });
        }

        // Recent-turn carve-out must leave something to compress.
        if self.history.auto && self.history.keep_recent >= self.history.compress_after_turns {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "history.keep_recent".into(),
                message: format!(
                    "keep_recent ({}) must be smaller than compress_after_turns ({})",
                    self.history.keep_recent, self.history.compress_after_turns
                ),
            });
        }

        // A zero-turn window hides everything from the reasoner.
        if self.context.active_window_turns == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Warning,
                field: "context.active_window_turns".into(),
                message: "window of 0 keeps only the current turn's entities active".into(),
            });
        }

        if self.jobs.max_in_memory == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "jobs.max_in_memory".into(),
                message: "max_in_memory must be greater than 0".into(),
            });
        }

        if self.sessions.stale_after_minutes == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Warning,
                field: "sessions.stale_after_minutes".into(),
                message: "0 marks every session stale immediately".into(),
            });
        }

        // CORS: warn if wildcard is used.
        if self.server.cors.allowed_origins.len() == 1
            && self.server.cors.allowed_origins[0] == "*"
        {
            errors.push(ConfigError {
                severity: ConfigSeverity::Warning,
                field: "server.cors.allowed_origins".into(),
                message: "wildcard \"*\" allows all origins (not recommended for production)".into(),
            });
        }

        errors
    }
}
