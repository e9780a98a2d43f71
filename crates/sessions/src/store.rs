//! The session state store: one `commit` entry point, cache in front of
//! durable storage, status derivation.
//!
//! Everything that wants to change a session goes through [`SessionStateStore::commit`]
//! with a whole-state working copy. The store stamps the activity
//! timestamp, writes durable storage first, and only then lets the cache
//! see the new state. There is no other mutation path, and the store
//! holds the only backend handle.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::{Duration, Utc};
use parking_lot::RwLock;
use serde::Serialize;

use cs_domain::config::SessionsConfig;
use cs_domain::error::{Error, Result};
use cs_domain::trace::TraceEvent;

use crate::durable::{JsonFileBackend, SessionBackend};
use crate::state::SessionState;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Status
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Derived, never stored. Stale sessions still load and still accept
/// turns; the flag only tells the caller the conversation has been
/// sitting for a while.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Stale,
    None,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Active => "active",
            SessionStatus::Stale => "stale",
            SessionStatus::None => "none",
        }
    }
}

/// Listing row for the sessions endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct SessionOverview {
    pub session_id: String,
    pub status: SessionStatus,
    pub created_at: chrono::DateTime<Utc>,
    pub last_active_at: chrono::DateTime<Utc>,
    pub turn_count: usize,
    pub entity_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_message: Option<String>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Store
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct SessionStateStore {
    backend: Arc<dyn SessionBackend>,
    cache: RwLock<HashMap<String, SessionState>>,
    stale_after: Duration,
    cache_max_entries: usize,
}

impl SessionStateStore {
    /// Production store over the JSON file backend at `cfg.state_dir`.
    pub fn new(cfg: &SessionsConfig) -> Result<Self> {
        let backend = Arc::new(JsonFileBackend::new(&cfg.state_dir)?);
        Ok(Self::with_backend(backend, cfg))
    }

    pub fn with_backend(backend: Arc<dyn SessionBackend>, cfg: &SessionsConfig) -> Self {
        Self {
            backend,
            cache: RwLock::new(HashMap::new()),
            stale_after: Duration::minutes(cfg.stale_after_minutes as i64),
            cache_max_entries: cfg.cache_max_entries,
        }
    }

    /// Persist a turn's worth of state. Stamps `last_active_at`, writes
    /// durable storage, then updates the cache. On any storage error the
    /// cache is untouched and the timestamp never became visible: a
    /// failed turn leaves no trace.
    pub async fn commit(&self, state: &mut SessionState) -> Result<()> {
        let start = Instant::now();
        state.last_active_at = Utc::now();

        let snapshot = state.clone();
        let backend = Arc::clone(&self.backend);
        let snapshot = tokio::task::spawn_blocking(move || -> Result<SessionState> {
            backend.upsert(&snapshot)?;
            Ok(snapshot)
        })
        .await
        .map_err(|e| Error::Other(format!("spawn_blocking join: {e}")))??;

        TraceEvent::SessionCommitted {
            session_id: snapshot.session_id.clone(),
            turn_count: snapshot.history.turn_count(),
            entity_count: snapshot.entities.len(),
            duration_ms: start.elapsed().as_millis() as u64,
        }
        .emit();

        {
            let mut cache = self.cache.write();
            cache.insert(snapshot.session_id.clone(), snapshot);
        }
        self.evict_excess();
        Ok(())
    }

    /// Cache first, durable storage as fallback. A state read from disk
    /// keeps its stored timestamps; if a commit slipped in between the
    /// cache miss and the disk read, the newer copy wins.
    pub async fn load(&self, session_id: &str) -> Result<Option<SessionState>> {
        {
            let cache = self.cache.read();
            if let Some(state) = cache.get(session_id) {
                return Ok(Some(state.clone()));
            }
        }

        let backend = Arc::clone(&self.backend);
        let id = session_id.to_owned();
        let disk = tokio::task::spawn_blocking(move || backend.fetch(&id))
            .await
            .map_err(|e| Error::Other(format!("spawn_blocking join: {e}")))??;

        let Some(disk_state) = disk else {
            return Ok(None);
        };

        TraceEvent::SessionLoaded {
            session_id: session_id.to_owned(),
            source: "disk".into(),
            turn_count: disk_state.history.turn_count(),
        }
        .emit();

        let winner = {
            let mut cache = self.cache.write();
            match cache.get(session_id) {
                Some(existing) if existing.last_active_at >= disk_state.last_active_at => {
                    existing.clone()
                }
                _ => {
                    cache.insert(session_id.to_owned(), disk_state.clone());
                    disk_state
                }
            }
        };
        self.evict_excess();
        Ok(Some(winner))
    }

    /// Derive the session's status. Non-mutating.
    pub async fn status(&self, session_id: &str) -> Result<SessionStatus> {
        match self.load(session_id).await? {
            None => Ok(SessionStatus::None),
            Some(state) => {
                if Utc::now() - state.last_active_at > self.stale_after {
                    Ok(SessionStatus::Stale)
                } else {
                    Ok(SessionStatus::Active)
                }
            }
        }
    }

    /// Listing rows for every known session, most recently active first.
    pub async fn list_overviews(&self) -> Result<Vec<SessionOverview>> {
        let backend = Arc::clone(&self.backend);
        let ids = tokio::task::spawn_blocking(move || backend.list_ids())
            .await
            .map_err(|e| Error::Other(format!("spawn_blocking join: {e}")))??;

        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(state) = self.load(&id).await? {
                let status = if Utc::now() - state.last_active_at > self.stale_after {
                    SessionStatus::Stale
                } else {
                    SessionStatus::Active
                };
                out.push(SessionOverview {
                    session_id: state.session_id.clone(),
                    status,
                    created_at: state.created_at,
                    last_active_at: state.last_active_at,
                    turn_count: state.history.turn_count(),
                    entity_count: state.entities.len(),
                    last_message: state
                        .history
                        .last_turn()
                        .filter(|t| !t.compressed)
                        .map(|t| t.assistant_text.clone()),
                });
            }
        }
        out.sort_by(|a, b| b.last_active_at.cmp(&a.last_active_at));
        Ok(out)
    }

    /// Forget a session everywhere: cache and durable storage.
    pub async fn reset(&self, session_id: &str) -> Result<()> {
        self.cache.write().remove(session_id);
        let backend = Arc::clone(&self.backend);
        let id = session_id.to_owned();
        tokio::task::spawn_blocking(move || backend.remove(&id))
            .await
            .map_err(|e| Error::Other(format!("spawn_blocking join: {e}")))??;
        tracing::info!(session_id, "session reset");
        Ok(())
    }

    /// Number of sessions currently cached (health/ops surface).
    pub fn cached_sessions(&self) -> usize {
        self.cache.read().len()
    }

    /// Drop the least recently active cached entries over the cap. Disk
    /// copies are unaffected; evicted sessions reload on demand.
    fn evict_excess(&self) {
        let mut cache = self.cache.write();
        while cache.len() > self.cache_max_entries {
            let oldest = cache
                .iter()
                .min_by_key(|(_, s)| s.last_active_at)
                .map(|(k, _)| k.clone());
            match oldest {
                Some(key) => {
                    cache.remove(&key);
                }
                None => break,
            }
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
