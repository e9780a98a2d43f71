//! Job tracking — persistent execution records for every submitted turn.
//!
//! Each accepted turn produces a `Job` with a unique UUID. The job moves
//! through `pending → running → {complete, failed}` and may then be
//! acknowledged by the client. Jobs are persisted to a JSONL file and
//! kept in a bounded in-memory ring for fast queries; per-job broadcast
//! channels feed the SSE relay.

use std::collections::{HashMap, HashSet, VecDeque};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use cs_collab::{DecisionKind, PendingConfirmation, StepResult};
use cs_domain::config::JobsConfig;
use cs_domain::trace::TraceEvent;

use super::truncate_str;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Job status
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Complete,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Failed)
    }

    /// Legal forward transitions. Acknowledgement is a flag on terminal
    /// jobs, not a status, so it never appears here.
    pub fn may_become(self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Pending, JobStatus::Running)
                | (JobStatus::Pending, JobStatus::Failed)
                | (JobStatus::Running, JobStatus::Complete)
                | (JobStatus::Running, JobStatus::Failed)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Complete => "complete",
            JobStatus::Failed => "failed",
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Job record
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// What the client submitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnRequest {
    pub session_id: String,
    pub user_text: String,
}

/// What a completed turn produced. Stored on the job so a reconnecting
/// client can fetch the reply without replaying events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnOutcome {
    pub turn_index: u32,
    pub assistant_text: String,
    pub decision_kind: DecisionKind,
    #[serde(default)]
    pub entities_touched: Vec<String>,
    #[serde(default)]
    pub step_results: Vec<StepResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_confirmation: Option<PendingConfirmation>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub job_id: Uuid,
    pub session_id: String,
    pub status: JobStatus,
    pub input: TurnRequest,
    /// First ~200 chars of the user text, for list views.
    pub input_preview: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<TurnOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    /// Set once by `acknowledge`; acknowledged jobs leave `get_active`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub acknowledged_at: Option<DateTime<Utc>>,
}

impl Job {
    pub fn new(input: TurnRequest) -> Self {
        Self {
            job_id: Uuid::new_v4(),
            session_id: input.session_id.clone(),
            status: JobStatus::Pending,
            input_preview: truncate_str(&input.user_text, 200),
            input,
            output: None,
            error: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            duration_ms: None,
            acknowledged_at: None,
        }
    }

    pub fn is_acknowledged(&self) -> bool {
        self.acknowledged_at.is_some()
    }

    fn finish(&mut self, status: JobStatus) {
        self.status = status;
        let now = Utc::now();
        self.completed_at = Some(now);
        let from = self.started_at.unwrap_or(self.created_at);
        self.duration_ms = Some((now - from).num_milliseconds().max(0) as u64);
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Job events (for SSE broadcast)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum JobEvent {
    #[serde(rename = "job.status")]
    Status { job_id: Uuid, status: JobStatus },
    #[serde(rename = "step")]
    Step { job_id: Uuid, step: StepResult },
    #[serde(rename = "assistant")]
    Assistant { job_id: Uuid, text: String },
    /// Terminal marker carrying the finished job; closes the SSE stream.
    #[serde(rename = "done")]
    Done { job_id: Uuid, job: Box<Job> },
}

impl JobEvent {
    pub fn name(&self) -> &'static str {
        match self {
            JobEvent::Status { .. } => "job.status",
            JobEvent::Step { .. } => "step",
            JobEvent::Assistant { .. } => "assistant",
            JobEvent::Done { .. } => "done",
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Acknowledge outcome
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug)]
pub enum AckOutcome {
    Acknowledged(Job),
    /// Already acknowledged before this call; same-state no-op.
    AlreadyAcknowledged(Job),
    /// The job has not finished; acknowledging it makes no sense yet.
    NotTerminal(JobStatus),
    NotFound,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Job store
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct JobStore {
    /// Bounded ring of recent jobs (newest last) + O(1) index.
    inner: RwLock<JobStoreInner>,
    /// JSONL persistence path.
    log_path: PathBuf,
    max_in_memory: usize,
    /// Per-job broadcast channels for SSE.
    event_channels: RwLock<HashMap<Uuid, broadcast::Sender<JobEvent>>>,
}

/// Interior state behind the RwLock: VecDeque plus a HashMap index that
/// maps job_id to a logical sequence number. The logical offset tracks
/// how many entries have been popped from the front so the HashMap
/// values never need bulk adjustment.
struct JobStoreInner {
    jobs: VecDeque<Job>,
    index: HashMap<Uuid, usize>,
    /// Logical sequence number of the front element.
    base_seq: usize,
}

impl JobStoreInner {
    fn new(jobs: VecDeque<Job>) -> Self {
        let mut index = HashMap::with_capacity(jobs.len());
        for (i, job) in jobs.iter().enumerate() {
            index.insert(job.job_id, i);
        }
        Self {
            jobs,
            index,
            base_seq: 0,
        }
    }

    fn deque_idx(&self, seq: usize) -> usize {
        seq - self.base_seq
    }

    fn get_mut(&mut self, job_id: &Uuid) -> Option<&mut Job> {
        let seq = *self.index.get(job_id)?;
        let idx = self.deque_idx(seq);
        self.jobs.get_mut(idx)
    }

    fn get(&self, job_id: &Uuid) -> Option<&Job> {
        let seq = *self.index.get(job_id)?;
        let idx = self.deque_idx(seq);
        self.jobs.get(idx)
    }

    fn push_back(&mut self, job: Job) {
        let seq = self.base_seq + self.jobs.len();
        self.index.insert(job.job_id, seq);
        self.jobs.push_back(job);
    }

    fn pop_front(&mut self) -> Option<Job> {
        let job = self.jobs.pop_front()?;
        self.index.remove(&job.job_id);
        self.base_seq += 1;
        Some(job)
    }

    /// Drop everything a predicate rejects and rebuild the index.
    fn retain<P: FnMut(&Job) -> bool>(&mut self, pred: P) -> usize {
        let before = self.jobs.len();
        self.jobs.retain(pred);
        self.index.clear();
        self.base_seq = 0;
        for (i, job) in self.jobs.iter().enumerate() {
            self.index.insert(job.job_id, i);
        }
        before - self.jobs.len()
    }
}

impl JobStore {
    /// Create a new JobStore, loading recent jobs from the JSONL file.
    pub fn new(cfg: &JobsConfig) -> Self {
        if let Some(dir) = cfg.log_file.parent() {
            std::fs::create_dir_all(dir).ok();
        }

        let (jobs, total_on_disk) = Self::load_recent(&cfg.log_file, cfg.max_in_memory);

        // Prune the JSONL file if it held more entries than we kept.
        if total_on_disk > jobs.len() {
            tracing::info!(
                kept = jobs.len(),
                pruned = total_on_disk - jobs.len(),
                "pruning jobs JSONL on disk"
            );
            Self::rewrite_jsonl(&cfg.log_file, &jobs);
        }

        Self {
            inner: RwLock::new(JobStoreInner::new(jobs)),
            log_path: cfg.log_file.clone(),
            max_in_memory: cfg.max_in_memory,
            event_channels: RwLock::new(HashMap::new()),
        }
    }

    /// Load the most recent `max` jobs from the JSONL file. A job may
    /// appear on several lines (finish, then acknowledge); the last line
    /// wins. Returns (jobs, total_line_count) to detect pruning.
    fn load_recent(path: &Path, max: usize) -> (VecDeque<Job>, usize) {
        let mut jobs = VecDeque::new();
        let mut seen: HashSet<Uuid> = HashSet::new();
        let mut total = 0;
        if let Ok(content) = std::fs::read_to_string(path) {
            let lines: Vec<&str> = content.lines().collect();
            total = lines.len();
            for line in lines.iter().rev() {
                if jobs.len() >= max {
                    break;
                }
                if let Ok(job) = serde_json::from_str::<Job>(line) {
                    if seen.insert(job.job_id) {
                        jobs.push_front(job);
                    }
                }
            }
        }
        (jobs, total)
    }

    /// Rewrite the JSONL file with only the given jobs (disk pruning).
    fn rewrite_jsonl(path: &Path, jobs: &VecDeque<Job>) {
        let tmp = path.with_extension("jsonl.tmp");
        let mut ok = false;
        if let Ok(mut f) = std::fs::File::create(&tmp) {
            ok = true;
            for job in jobs {
                if let Ok(json) = serde_json::to_string(job) {
                    if writeln!(f, "{}", json).is_err() {
                        ok = false;
                        break;
                    }
                }
            }
        }
        if ok {
            let _ = std::fs::rename(&tmp, path);
        } else {
            let _ = std::fs::remove_file(&tmp);
        }
    }

    /// Insert a new job. Returns the job_id.
    pub fn insert(&self, job: Job) -> Uuid {
        let job_id = job.job_id;
        let mut inner = self.inner.write();
        inner.push_back(job);
        if inner.jobs.len() > self.max_in_memory {
            inner.pop_front();
        }
        job_id
    }

    /// Move a job to `next`, refusing illegal transitions. On a legal
    /// move the timestamps are stamped and `f` fills in payload fields.
    /// Returns the updated job, or None when the job is missing or the
    /// transition was refused.
    fn advance<F>(&self, job_id: &Uuid, next: JobStatus, f: F) -> Option<Job>
    where
        F: FnOnce(&mut Job),
    {
        let mut inner = self.inner.write();
        let job = inner.get_mut(job_id)?;
        if !job.status.may_become(next) {
            tracing::warn!(
                %job_id,
                from = job.status.as_str(),
                to = next.as_str(),
                "refusing illegal job transition"
            );
            return None;
        }
        match next {
            JobStatus::Running => {
                job.status = JobStatus::Running;
                job.started_at = Some(Utc::now());
            }
            JobStatus::Complete | JobStatus::Failed => job.finish(next),
            JobStatus::Pending => unreachable!("no transition leads back to pending"),
        }
        f(job);
        Some(job.clone())
    }

    /// Pending → Running.
    pub fn start(&self, job_id: &Uuid) -> Option<Job> {
        let job = self.advance(job_id, JobStatus::Running, |_| {})?;
        self.emit(
            job_id,
            JobEvent::Status {
                job_id: *job_id,
                status: JobStatus::Running,
            },
        );
        Some(job)
    }

    /// Running → Complete, storing the outcome. The turn pipeline commits
    /// session state immediately before calling this.
    pub fn complete(&self, job_id: &Uuid, outcome: TurnOutcome) -> Option<Job> {
        let job = self.advance(job_id, JobStatus::Complete, |j| {
            j.output = Some(outcome);
        })?;
        self.persist(&job);
        self.finish_channel(&job);
        Some(job)
    }

    /// → Failed, storing the error. No session commit happened.
    pub fn fail(&self, job_id: &Uuid, error: String) -> Option<Job> {
        let job = self.advance(job_id, JobStatus::Failed, |j| {
            j.error = Some(error);
        })?;
        self.persist(&job);
        self.finish_channel(&job);
        Some(job)
    }

    /// Emit the terminal `done` event and drop the broadcast channel.
    fn finish_channel(&self, job: &Job) {
        self.emit(
            &job.job_id,
            JobEvent::Done {
                job_id: job.job_id,
                job: Box::new(job.clone()),
            },
        );
        self.cleanup_channel(&job.job_id);
    }

    /// Persist a job to the JSONL file (append).
    pub fn persist(&self, job: &Job) {
        if let Ok(json) = serde_json::to_string(job) {
            if let Ok(mut file) = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.log_path)
            {
                let _ = writeln!(file, "{json}");
            }
        }
    }

    /// Get a job by ID (O(1) via index).
    pub fn get(&self, job_id: &Uuid) -> Option<Job> {
        let inner = self.inner.read();
        inner.get(job_id).cloned()
    }

    /// The job a reconnecting client should care about: the most recent
    /// pending/running job for the session, else the most recent finished
    /// job the client has not acknowledged yet.
    pub fn get_active(&self, session_id: &str) -> Option<Job> {
        let inner = self.inner.read();
        let mut unacked: Option<&Job> = None;
        for job in inner.jobs.iter().rev() {
            if job.session_id != session_id {
                continue;
            }
            if !job.status.is_terminal() {
                return Some(job.clone());
            }
            if unacked.is_none() && !job.is_acknowledged() {
                unacked = Some(job);
            }
        }
        unacked.cloned()
    }

    /// Acknowledge a finished job. Idempotent: a repeat call reports
    /// `AlreadyAcknowledged` and changes nothing.
    pub fn acknowledge(&self, job_id: &Uuid) -> AckOutcome {
        let outcome = {
            let mut inner = self.inner.write();
            let Some(job) = inner.get_mut(job_id) else {
                return AckOutcome::NotFound;
            };
            if !job.status.is_terminal() {
                return AckOutcome::NotTerminal(job.status);
            }
            if job.is_acknowledged() {
                AckOutcome::AlreadyAcknowledged(job.clone())
            } else {
                job.acknowledged_at = Some(Utc::now());
                AckOutcome::Acknowledged(job.clone())
            }
        };
        if let AckOutcome::Acknowledged(job) = &outcome {
            self.persist(job);
            TraceEvent::JobAcknowledged {
                job_id: job.job_id.to_string(),
                already_acknowledged: false,
            }
            .emit();
        }
        if let AckOutcome::AlreadyAcknowledged(job) = &outcome {
            TraceEvent::JobAcknowledged {
                job_id: job.job_id.to_string(),
                already_acknowledged: true,
            }
            .emit();
        }
        outcome
    }

    /// List jobs with optional filters and pagination, newest first.
    ///
    /// Two passes: count total matches, then collect only the requested
    /// page, avoiding an intermediate Vec.
    pub fn list(
        &self,
        status: Option<JobStatus>,
        session_id: Option<&str>,
        limit: usize,
        offset: usize,
    ) -> (Vec<Job>, usize) {
        let inner = self.inner.read();
        let filter = |j: &&Job| -> bool {
            if let Some(s) = status {
                if j.status != s {
                    return false;
                }
            }
            if let Some(sid) = session_id {
                if j.session_id != sid {
                    return false;
                }
            }
            true
        };

        let total = inner.jobs.iter().rev().filter(filter).count();
        let page: Vec<Job> = inner
            .jobs
            .iter()
            .rev()
            .filter(filter)
            .skip(offset)
            .take(limit)
            .cloned()
            .collect();

        (page, total)
    }

    /// Get or create a broadcast channel for a job (for SSE).
    pub fn subscribe(&self, job_id: &Uuid) -> broadcast::Receiver<JobEvent> {
        let mut channels = self.event_channels.write();
        let tx = channels
            .entry(*job_id)
            .or_insert_with(|| broadcast::channel(128).0);
        tx.subscribe()
    }

    /// Emit an event for a job (broadcast to all subscribers).
    pub fn emit(&self, job_id: &Uuid, event: JobEvent) {
        let channels = self.event_channels.read();
        if let Some(tx) = channels.get(job_id) {
            let _ = tx.send(event);
        }
    }

    /// Drop the broadcast channel for a finished job.
    pub fn cleanup_channel(&self, job_id: &Uuid) {
        let mut channels = self.event_channels.write();
        channels.remove(job_id);
    }

    /// Evict acknowledged jobs older than `ttl` from the ring. Disk
    /// history keeps them until the next startup prune.
    pub fn gc_acknowledged(&self, ttl: chrono::Duration) -> usize {
        let cutoff = Utc::now() - ttl;
        let removed = self
            .inner
            .write()
            .retain(|j| !matches!(j.acknowledged_at, Some(at) if at < cutoff));
        if removed > 0 {
            tracing::debug!(removed, "evicted acknowledged jobs");
        }
        removed
    }

    /// Count jobs by status (ops surface).
    pub fn status_counts(&self) -> HashMap<String, usize> {
        let inner = self.inner.read();
        let mut counts = HashMap::new();
        for job in inner.jobs.iter() {
            *counts
                .entry(job.status.as_str().to_string())
                .or_insert(0) += 1;
        }
        counts
    }

    pub fn len(&self) -> usize {
        self.inner.read().jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().jobs.is_empty()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;

    fn test_store(dir: &Path) -> JobStore {
        JobStore::new(&JobsConfig {
            log_file: dir.join("jobs.jsonl"),
            max_in_memory: 2000,
            ..JobsConfig::default()
        })
    }

    fn request(session: &str, text: &str) -> TurnRequest {
        TurnRequest {
            session_id: session.into(),
            user_text: text.into(),
        }
    }

    fn outcome(text: &str) -> TurnOutcome {
        TurnOutcome {
            turn_index: 1,
            assistant_text: text.into(),
            decision_kind: DecisionKind::Execute,
            entities_touched: Vec::new(),
            step_results: Vec::new(),
            pending_confirmation: None,
        }
    }

    #[test]
    fn job_moves_through_the_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let store = test_store(dir.path());

        let job = Job::new(request("s1", "plan dinner"));
        let id = store.insert(job);

        let started = store.start(&id).unwrap();
        assert_eq!(started.status, JobStatus::Running);
        assert!(started.started_at.is_some());

        let done = store.complete(&id, outcome("done")).unwrap();
        assert_eq!(done.status, JobStatus::Complete);
        assert!(done.completed_at.is_some());
        assert!(done.duration_ms.is_some());
        assert_eq!(done.output.unwrap().assistant_text, "done");
    }

    #[test]
    fn illegal_transitions_are_refused() {
        let dir = tempfile::tempdir().unwrap();
        let store = test_store(dir.path());

        let id = store.insert(Job::new(request("s1", "hi")));
        // Complete before start: refused, status unchanged.
        assert!(store.complete(&id, outcome("x")).is_none());
        assert_eq!(store.get(&id).unwrap().status, JobStatus::Pending);

        store.start(&id);
        store.complete(&id, outcome("x"));
        // A finished job never runs again.
        assert!(store.start(&id).is_none());
        assert!(store.fail(&id, "late".into()).is_none());
        assert_eq!(store.get(&id).unwrap().status, JobStatus::Complete);
    }

    #[test]
    fn pending_jobs_may_fail_directly() {
        let dir = tempfile::tempdir().unwrap();
        let store = test_store(dir.path());

        let id = store.insert(Job::new(request("s1", "hi")));
        let failed = store.fail(&id, "spawn error".into()).unwrap();
        assert_eq!(failed.status, JobStatus::Failed);
        assert_eq!(failed.error.as_deref(), Some("spawn error"));
    }

    #[test]
    fn get_active_prefers_in_flight_over_unacknowledged() {
        let dir = tempfile::tempdir().unwrap();
        let store = test_store(dir.path());

        let old = store.insert(Job::new(request("s1", "first")));
        store.start(&old);
        store.complete(&old, outcome("first reply"));

        // Finished but unacknowledged: still the active job.
        assert_eq!(store.get_active("s1").unwrap().job_id, old);

        let new = store.insert(Job::new(request("s1", "second")));
        store.start(&new);
        // A running job wins over the unacknowledged one.
        assert_eq!(store.get_active("s1").unwrap().job_id, new);

        store.complete(&new, outcome("second reply"));
        // Newest unacknowledged wins.
        assert_eq!(store.get_active("s1").unwrap().job_id, new);

        assert!(matches!(
            store.acknowledge(&new),
            AckOutcome::Acknowledged(_)
        ));
        assert_eq!(store.get_active("s1").unwrap().job_id, old);
        store.acknowledge(&old);
        assert!(store.get_active("s1").is_none());

        // Other sessions never see it.
        assert!(store.get_active("s2").is_none());
    }

    #[test]
    fn acknowledge_is_idempotent_and_gated_on_terminal() {
        let dir = tempfile::tempdir().unwrap();
        let store = test_store(dir.path());

        let id = store.insert(Job::new(request("s1", "hi")));
        assert!(matches!(
            store.acknowledge(&id),
            AckOutcome::NotTerminal(JobStatus::Pending)
        ));

        store.start(&id);
        store.fail(&id, "boom".into());

        let first = store.acknowledge(&id);
        assert!(matches!(first, AckOutcome::Acknowledged(_)));
        let stamped = store.get(&id).unwrap().acknowledged_at.unwrap();

        let second = store.acknowledge(&id);
        assert!(matches!(second, AckOutcome::AlreadyAcknowledged(_)));
        // The timestamp did not move.
        assert_eq!(store.get(&id).unwrap().acknowledged_at.unwrap(), stamped);

        assert!(matches!(
            store.acknowledge(&Uuid::new_v4()),
            AckOutcome::NotFound
        ));
    }

    #[test]
    fn persist_and_reload_keeps_the_latest_line() {
        let dir = tempfile::tempdir().unwrap();
        let job_id;
        {
            let store = test_store(dir.path());
            job_id = store.insert(Job::new(request("s1", "hi")));
            store.start(&job_id);
            store.complete(&job_id, outcome("reply"));
            // complete() and acknowledge() both append a line.
            store.acknowledge(&job_id);
        }

        let store = test_store(dir.path());
        assert_eq!(store.len(), 1);
        let job = store.get(&job_id).unwrap();
        assert_eq!(job.status, JobStatus::Complete);
        assert!(job.is_acknowledged());
    }

    #[test]
    fn ring_is_bounded() {
        let dir = tempfile::tempdir().unwrap();
        let store = JobStore::new(&JobsConfig {
            log_file: dir.path().join("jobs.jsonl"),
            max_in_memory: 5,
            ..JobsConfig::default()
        });

        for i in 0..8 {
            store.insert(Job::new(request("s1", &format!("msg{i}"))));
        }
        assert_eq!(store.len(), 5);
        let (page, total) = store.list(None, None, 10, 0);
        assert_eq!(total, 5);
        assert_eq!(page[0].input.user_text, "msg7");
    }

    #[test]
    fn list_filters_and_paginates() {
        let dir = tempfile::tempdir().unwrap();
        let store = test_store(dir.path());

        for i in 0..5 {
            let id = store.insert(Job::new(request("s1", &format!("msg{i}"))));
            if i % 2 == 0 {
                store.start(&id);
                store.complete(&id, outcome("r"));
            }
        }
        store.insert(Job::new(request("s2", "other")));

        let (complete, total) = store.list(Some(JobStatus::Complete), None, 10, 0);
        assert_eq!(total, 3);
        assert_eq!(complete.len(), 3);

        let (s1_jobs, s1_total) = store.list(None, Some("s1"), 10, 0);
        assert_eq!(s1_total, 5);
        assert_eq!(s1_jobs.len(), 5);

        let (page1, _) = store.list(None, Some("s1"), 2, 0);
        let (page2, _) = store.list(None, Some("s1"), 2, 2);
        assert_eq!(page1.len(), 2);
        assert_eq!(page2.len(), 2);
        assert!(page1.iter().all(|a| page2.iter().all(|b| a.job_id != b.job_id)));
    }

    #[test]
    fn gc_evicts_only_expired_acknowledged_jobs() {
        let dir = tempfile::tempdir().unwrap();
        let store = test_store(dir.path());

        let expired = store.insert(Job::new(request("s1", "old")));
        store.start(&expired);
        store.complete(&expired, outcome("r"));
        store.acknowledge(&expired);
        // Backdate the acknowledgement.
        store.inner.write().get_mut(&expired).unwrap().acknowledged_at =
            Some(Utc::now() - chrono::Duration::hours(2));

        let fresh = store.insert(Job::new(request("s1", "new")));
        store.start(&fresh);
        store.complete(&fresh, outcome("r"));
        store.acknowledge(&fresh);

        let running = store.insert(Job::new(request("s1", "busy")));
        store.start(&running);

        assert_eq!(store.gc_acknowledged(chrono::Duration::minutes(30)), 1);
        assert!(store.get(&expired).is_none());
        assert!(store.get(&fresh).is_some());
        assert!(store.get(&running).is_some());
    }

    #[test]
    fn terminal_transitions_broadcast_done() {
        let dir = tempfile::tempdir().unwrap();
        let store = test_store(dir.path());

        let id = store.insert(Job::new(request("s1", "hi")));
        let mut rx = store.subscribe(&id);
        store.start(&id);
        store.complete(&id, outcome("reply"));

        let first = rx.try_recv().unwrap();
        assert_eq!(first.name(), "job.status");
        let second = rx.try_recv().unwrap();
        match second {
            JobEvent::Done { job, .. } => {
                assert_eq!(job.output.unwrap().assistant_text, "reply")
            }
            other => panic!("expected done, got {other:?}"),
        }
    }

    #[test]
    fn status_counts_by_name() {
        let dir = tempfile::tempdir().unwrap();
        let store = test_store(dir.path());

        let a = store.insert(Job::new(request("s1", "a")));
        store.start(&a);
        store.complete(&a, outcome("r"));
        let b = store.insert(Job::new(request("s1", "b")));
        store.start(&b);
        store.fail(&b, "boom".into());
        store.insert(Job::new(request("s1", "c")));

        let counts = store.status_counts();
        assert_eq!(counts.get("complete"), Some(&1));
        assert_eq!(counts.get("failed"), Some(&1));
        assert_eq!(counts.get("pending"), Some(&1));
    }
}
