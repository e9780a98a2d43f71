//! Broadcast-to-SSE bridge for job events.
//!
//! The receiver half lives inside the HTTP response stream, so a client
//! disconnect drops only the receiver. The job task keeps publishing
//! into the broadcast channel and runs to completion regardless; a
//! reconnecting client recovers the result through `get_active` or the
//! job endpoints.

use std::convert::Infallible;
use std::sync::Arc;

use axum::response::sse::Event;
use futures_util::stream::Stream;
use tokio::sync::broadcast;
use uuid::Uuid;

use cs_domain::trace::TraceEvent;

use super::jobs::{JobEvent, JobStore};

/// Forward a job's events until the terminal `done` marker, then close.
///
/// A `Lagged` receiver gets a warning event and keeps going: what was
/// lost is progress detail, and the terminal snapshot still arrives.
/// The status re-check after attaching covers the job finishing between
/// the handler's lookup and the subscription; without it the client
/// would hang on a channel nothing writes to anymore. It only fires on
/// an empty receiver: a buffered backlog already ends in `done` (or in
/// `Closed`, handled below), and should be delivered in full.
pub fn job_event_stream(
    jobs: Arc<JobStore>,
    job_id: Uuid,
    mut rx: broadcast::Receiver<JobEvent>,
) -> impl Stream<Item = Result<Event, Infallible>> {
    async_stream::stream! {
        if rx.is_empty() {
            if let Some(job) = jobs.get(&job_id) {
                if job.status.is_terminal() {
                    yield Ok(done_event(job_id, job));
                    return;
                }
            }
        }

        loop {
            match rx.recv().await {
                Ok(event) => {
                    let name = event.name();
                    let data = serde_json::to_string(&event).unwrap_or_default();
                    yield Ok(Event::default().event(name).data(data));

                    if matches!(event, JobEvent::Done { .. }) {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    TraceEvent::RelayLagged {
                        job_id: job_id.to_string(),
                        skipped,
                    }
                    .emit();
                    let msg = format!("{{\"warning\":\"missed {skipped} events\"}}");
                    yield Ok(Event::default().event("warning").data(msg));
                }
                // Sender gone without an observed `done`: fall back to the
                // stored record so the client still sees a terminal event.
                Err(broadcast::error::RecvError::Closed) => {
                    if let Some(job) = jobs.get(&job_id) {
                        if job.status.is_terminal() {
                            yield Ok(done_event(job_id, job));
                        }
                    }
                    break;
                }
            }
        }
    }
}

fn done_event(job_id: Uuid, job: super::jobs::Job) -> Event {
    let done = JobEvent::Done {
        job_id,
        job: Box::new(job),
    };
    let data = serde_json::to_string(&done).unwrap_or_default();
    Event::default().event("done").data(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::jobs::{Job, JobStatus, TurnOutcome, TurnRequest};

    use cs_collab::DecisionKind;
    use cs_domain::config::JobsConfig;
    use futures_util::StreamExt;

    fn test_store(dir: &std::path::Path) -> Arc<JobStore> {
        Arc::new(JobStore::new(&JobsConfig {
            log_file: dir.join("jobs.jsonl"),
            ..JobsConfig::default()
        }))
    }

    fn outcome() -> TurnOutcome {
        TurnOutcome {
            turn_index: 1,
            assistant_text: "done".into(),
            decision_kind: DecisionKind::Execute,
            entities_touched: Vec::new(),
            step_results: Vec::new(),
            pending_confirmation: None,
        }
    }

    fn insert_job(store: &JobStore) -> Uuid {
        store.insert(Job::new(TurnRequest {
            session_id: "s1".into(),
            user_text: "hi".into(),
        }))
    }

    #[tokio::test]
    async fn live_stream_ends_after_the_done_event() {
        let dir = tempfile::tempdir().unwrap();
        let store = test_store(dir.path());
        let id = insert_job(&store);

        let rx = store.subscribe(&id);
        store.start(&id);
        store.complete(&id, outcome());

        let mut stream = Box::pin(job_event_stream(store.clone(), id, rx));
        // Running status, then the terminal marker, then nothing.
        assert!(stream.next().await.is_some());
        assert!(stream.next().await.is_some());
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn attaching_to_a_finished_job_yields_one_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let store = test_store(dir.path());
        let id = insert_job(&store);
        store.start(&id);
        store.fail(&id, "boom".into());

        // Subscribing now creates a fresh channel nobody writes to; the
        // attach re-check must short-circuit.
        let rx = store.subscribe(&id);
        let mut stream = Box::pin(job_event_stream(store.clone(), id, rx));
        assert!(stream.next().await.is_some());
        assert!(stream.next().await.is_none());
        assert_eq!(store.get(&id).unwrap().status, JobStatus::Failed);
    }

    #[tokio::test]
    async fn lagged_receiver_is_warned_and_still_sees_the_end() {
        let dir = tempfile::tempdir().unwrap();
        let store = test_store(dir.path());
        let id = insert_job(&store);

        let rx = store.subscribe(&id);
        store.start(&id);
        // Overrun the channel so the receiver lags.
        for _ in 0..200 {
            store.emit(
                &id,
                JobEvent::Assistant {
                    job_id: id,
                    text: "chunk".into(),
                },
            );
        }
        store.complete(&id, outcome());

        let mut stream = Box::pin(job_event_stream(store.clone(), id, rx));
        let mut n = 0;
        while stream.next().await.is_some() {
            n += 1;
        }
        // Some events were dropped, the stream still terminated.
        assert!(n > 1);
        assert!(n < 202);
    }
}
