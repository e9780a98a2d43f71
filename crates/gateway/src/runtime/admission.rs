//! Per-session admission control.
//!
//! At most one turn runs per session at a time. A second submission
//! while a turn is in flight is rejected immediately rather than
//! queued, so the client gets a fast busy signal and can attach to the
//! active job instead of piling up stale turns.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Maps each session to a `Semaphore(1)`. Holding the permit means a
/// turn is executing for that session.
pub struct SessionGate {
    permits: Mutex<HashMap<String, Arc<Semaphore>>>,
}

impl Default for SessionGate {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionGate {
    pub fn new() -> Self {
        Self {
            permits: Mutex::new(HashMap::new()),
        }
    }

    /// Claim the session for one turn. The permit auto-releases on drop,
    /// which the job task does when it finishes either way.
    ///
    /// Never waits: a busy session rejects so the caller can answer 429.
    pub fn try_admit(&self, session_id: &str) -> Result<OwnedSemaphorePermit, SessionBusy> {
        let sem = {
            let mut permits = self.permits.lock();
            permits
                .entry(session_id.to_owned())
                .or_insert_with(|| Arc::new(Semaphore::new(1)))
                .clone()
        };
        sem.try_acquire_owned().map_err(|_| SessionBusy)
    }

    /// Number of tracked sessions (for monitoring).
    pub fn session_count(&self) -> usize {
        self.permits.lock().len()
    }

    /// Drop entries for sessions with no turn in flight. A held permit
    /// keeps its entry, and so does a semaphore with a clone checked out
    /// by a `try_admit` that has not acquired yet; the map never forgets
    /// a busy session.
    pub fn prune_idle(&self) {
        let mut permits = self.permits.lock();
        permits.retain(|_, sem| sem.available_permits() == 0 || Arc::strong_count(sem) > 1);
    }
}

/// Rejection from `try_admit`: a turn is already in progress.
#[derive(Debug)]
pub struct SessionBusy;

impl std::fmt::Display for SessionBusy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "a turn is already in progress for this session")
    }
}

impl std::error::Error for SessionBusy {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn busy_session_rejects_until_the_permit_drops() {
        let gate = SessionGate::new();

        let permit = gate.try_admit("s1").unwrap();
        assert!(gate.try_admit("s1").is_err());

        drop(permit);
        assert!(gate.try_admit("s1").is_ok());
    }

    #[test]
    fn sessions_are_independent() {
        let gate = SessionGate::new();

        let _p1 = gate.try_admit("s1").unwrap();
        let _p2 = gate.try_admit("s2").unwrap();
        assert_eq!(gate.session_count(), 2);
    }

    #[test]
    fn prune_keeps_only_busy_sessions() {
        let gate = SessionGate::new();

        let held = gate.try_admit("busy").unwrap();
        let released = gate.try_admit("idle").unwrap();
        drop(released);
        assert_eq!(gate.session_count(), 2);

        gate.prune_idle();
        assert_eq!(gate.session_count(), 1);

        drop(held);
        gate.prune_idle();
        assert_eq!(gate.session_count(), 0);
    }
}
