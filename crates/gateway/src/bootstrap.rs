//! AppState construction and background-task spawning extracted from
//! `main.rs`.
//!
//! Both the `serve` command and the one-shot `turn` command boot through
//! [`build_app_state`] so they run the identical pipeline; only `serve`
//! adds the HTTP listener and the background sweeps.

use std::sync::Arc;

use anyhow::Context;

use cs_collab::RestCollaborator;
use cs_domain::config::{Config, ConfigSeverity};
use cs_sessions::SessionStateStore;

use crate::runtime::admission::SessionGate;
use crate::runtime::jobs::JobStore;
use crate::state::AppState;

/// Validate config, initialize every subsystem and return a fully-wired
/// [`AppState`].
pub fn build_app_state(config: Arc<Config>) -> anyhow::Result<AppState> {
    // ── Config validation ────────────────────────────────────────────
    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Warning => tracing::warn!("config: {issue}"),
            ConfigSeverity::Error => tracing::error!("config: {issue}"),
        }
    }
    if issues.iter().any(|i| i.severity == ConfigSeverity::Error) {
        anyhow::bail!(
            "config validation failed with {} error(s)",
            issues
                .iter()
                .filter(|i| i.severity == ConfigSeverity::Error)
                .count()
        );
    }

    // ── Session state store ──────────────────────────────────────────
    let sessions = Arc::new(
        SessionStateStore::new(&config.sessions).context("initializing session state store")?,
    );
    tracing::info!(
        state_dir = %config.sessions.state_dir.display(),
        "session state store ready"
    );

    // ── Job store ────────────────────────────────────────────────────
    let jobs = Arc::new(JobStore::new(&config.jobs));
    tracing::info!(
        log_file = %config.jobs.log_file.display(),
        loaded = jobs.len(),
        "job store ready"
    );

    // ── Admission gate (per-session concurrency) ─────────────────────
    let gate = Arc::new(SessionGate::new());

    // ── Collaborators ────────────────────────────────────────────────
    let collab = Arc::new(
        RestCollaborator::new(&config.collab).context("initializing collaborator client")?,
    );
    tracing::info!(base_url = %config.collab.base_url, "collaborator client ready");

    Ok(AppState {
        reasoner: collab.clone(),
        summarizer: collab,
        sessions,
        jobs,
        gate,
        config,
    })
}

/// Spawn the long-running background sweeps. Call this **after**
/// [`build_app_state`] when running the HTTP server; the one-shot `turn`
/// command skips it.
pub fn spawn_background_tasks(state: &AppState) {
    // ── Acknowledged-job GC + admission gate pruning ─────────────────
    // (the session cache trims itself inline on commit)
    {
        let jobs = state.jobs.clone();
        let gate = state.gate.clone();
        let interval_secs = state.config.jobs.gc_interval_secs.max(1);
        let ttl = chrono::Duration::minutes(state.config.jobs.acknowledged_ttl_minutes as i64);
        tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(std::time::Duration::from_secs(interval_secs));
            loop {
                interval.tick().await;
                jobs.gc_acknowledged(ttl);
                gate.prune_idle();
            }
        });
    }
    tracing::info!("background tasks spawned");
}
