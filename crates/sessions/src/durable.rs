//! Durable session storage.
//!
//! One JSON document per session, upserted atomically (write to a temp
//! file, then rename). The backend trait exists so tests and future
//! database-backed deployments can swap the medium; the store above it
//! holds the only handle, which is what makes the single-writer
//! discipline structural rather than conventional.

use std::path::{Path, PathBuf};

use cs_domain::error::{Error, Result};

use crate::state::SessionState;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Backend trait
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Blob storage keyed by session id. Implementations are synchronous;
/// callers wrap them in `spawn_blocking` off the async path.
pub trait SessionBackend: Send + Sync {
    fn upsert(&self, state: &SessionState) -> Result<()>;
    fn fetch(&self, session_id: &str) -> Result<Option<SessionState>>;
    fn remove(&self, session_id: &str) -> Result<()>;
    fn list_ids(&self) -> Result<Vec<String>>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// JSON file backend
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Production backend: `<state_dir>/<session>.json` per session.
pub struct JsonFileBackend {
    dir: PathBuf,
}

impl JsonFileBackend {
    pub fn new(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir).map_err(Error::Io)?;
        tracing::info!(path = %dir.display(), "session state directory ready");
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    fn path_for(&self, session_id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", file_stem(session_id)))
    }
}

/// Session ids come from clients; keep only filesystem-safe characters
/// so an id cannot escape the state directory.
fn file_stem(session_id: &str) -> String {
    session_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

impl SessionBackend for JsonFileBackend {
    fn upsert(&self, state: &SessionState) -> Result<()> {
        let path = self.path_for(&state.session_id);
        let tmp = path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(state)?;
        std::fs::write(&tmp, json).map_err(Error::Io)?;
        std::fs::rename(&tmp, &path).map_err(Error::Io)?;
        Ok(())
    }

    fn fetch(&self, session_id: &str) -> Result<Option<SessionState>> {
        let path = self.path_for(session_id);
        if !path.exists() {
            return Ok(None);
        }
        let raw = std::fs::read_to_string(&path).map_err(Error::Io)?;
        match serde_json::from_str(&raw) {
            Ok(state) => Ok(Some(state)),
            Err(e) => {
                tracing::warn!(
                    session_id,
                    path = %path.display(),
                    error = %e,
                    "unreadable session state file; treating as absent"
                );
                Ok(None)
            }
        }
    }

    fn remove(&self, session_id: &str) -> Result<()> {
        let path = self.path_for(session_id);
        if path.exists() {
            std::fs::remove_file(&path).map_err(Error::Io)?;
        }
        Ok(())
    }

    fn list_ids(&self) -> Result<Vec<String>> {
        let mut ids = Vec::new();
        for entry in std::fs::read_dir(&self.dir).map_err(Error::Io)? {
            let entry = entry.map_err(Error::Io)?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if let Some(stem) = name.strip_suffix(".json") {
                ids.push(stem.to_string());
            }
        }
        ids.sort();
        Ok(ids)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
