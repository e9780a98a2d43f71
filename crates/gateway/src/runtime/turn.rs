//! Turn pipeline — the orchestrator behind every accepted job.
//!
//! [`submit_turn`] admits a turn, records a pending job, and spawns a
//! detached execution task; clients stream progress or poll the job.
//! The task loads session state into a private copy, folds history,
//! projects context, asks the reasoner, applies the decision, and makes
//! exactly one commit at the end. Failures leave the stored session
//! untouched.

use std::collections::{BTreeMap, HashSet};
use std::time::Duration;

use tracing::Instrument;
use uuid::Uuid;

use cs_collab::{EntityEffect, TurnContext};
use cs_domain::error::{Error, Result};
use cs_domain::trace::TraceEvent;
use cs_registry::{apply_curation, classify, LifecycleState, Verbosity};
use cs_sessions::{SessionState, Turn};

use crate::state::AppState;

use super::jobs::{Job, JobEvent, TurnOutcome, TurnRequest};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// submit_turn — admission + detached spawn
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Admit and launch one turn. Returns the pending job snapshot for the
/// 202 response; a session with a turn already in flight is rejected
/// with `Error::SessionBusy` and no job record.
///
/// The admission permit moves into the spawned task and releases when
/// the task ends, so the session reopens on any terminal transition.
pub fn submit_turn(state: &AppState, request: TurnRequest) -> Result<Job> {
    let permit = match state.gate.try_admit(&request.session_id) {
        Ok(permit) => permit,
        Err(_) => {
            TraceEvent::JobRejected {
                session_id: request.session_id.clone(),
            }
            .emit();
            return Err(Error::SessionBusy {
                session_id: request.session_id,
            });
        }
    };

    let job = Job::new(request.clone());
    let snapshot = job.clone();
    let job_id = state.jobs.insert(job);
    TraceEvent::JobAdmitted {
        job_id: job_id.to_string(),
        session_id: request.session_id.clone(),
    }
    .emit();

    let task_state = state.clone();
    let span = tracing::info_span!("turn", %job_id, session_id = %request.session_id);
    tokio::spawn(
        async move {
            let _permit = permit;
            run_job(task_state, job_id, request).await;
        }
        .instrument(span),
    );

    Ok(snapshot)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// run_job — the detached task
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Drive one job from running to terminal, under the configured per-turn
/// timeout (0 disables it). Nothing here observes client disconnects;
/// the relay layer absorbs those.
async fn run_job(state: AppState, job_id: Uuid, request: TurnRequest) {
    state.jobs.start(&job_id);

    let timeout_secs = state.config.jobs.turn_timeout_secs;
    let result = if timeout_secs == 0 {
        execute_turn(&state, &job_id, &request).await
    } else {
        match tokio::time::timeout(
            Duration::from_secs(timeout_secs),
            execute_turn(&state, &job_id, &request),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout(format!(
                "turn exceeded the {timeout_secs}s limit"
            ))),
        }
    };

    let finished = match result {
        Ok(outcome) => state.jobs.complete(&job_id, outcome),
        Err(e) => {
            tracing::warn!(error = %e, "turn failed");
            state.jobs.fail(&job_id, e.to_string())
        }
    };
    if let Some(job) = finished {
        TraceEvent::JobFinished {
            job_id: job.job_id.to_string(),
            session_id: job.session_id.clone(),
            status: job.status.as_str().to_string(),
            duration_ms: job.duration_ms.unwrap_or(0),
        }
        .emit();
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// execute_turn — the pipeline proper
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Run the whole turn against a working copy of the session. Every `?`
/// before the final commit aborts with the stored state unchanged.
async fn execute_turn(
    state: &AppState,
    job_id: &Uuid,
    request: &TurnRequest,
) -> Result<TurnOutcome> {
    let session_id = &request.session_id;

    let mut session = state
        .sessions
        .load(session_id)
        .await?
        .unwrap_or_else(|| SessionState::new(session_id.clone()));

    let turn_index = session.next_turn_index();

    // Fold old history before building the context. A failing summarizer
    // only costs this cycle; the report says so and the turn proceeds.
    session
        .history
        .compress_if_needed(session_id, state.summarizer.as_ref(), &state.config.history)
        .await;

    session.prune_expired_constraints(turn_index);

    // Project what the reasoner is allowed to see: callsigns only, never
    // a durable identifier.
    let tiers = classify(&session.entities, turn_index, &state.config.context);
    let context_refs = session.entities.format_for_consumer(&tiers, Verbosity::Full);
    let history = session
        .history
        .format_for_reasoning(state.config.history.keep_recent);
    let constraints: BTreeMap<String, serde_json::Value> = session
        .constraints_at(turn_index)
        .into_iter()
        .map(|(name, c)| (name.to_string(), c.value.clone()))
        .collect();

    let ctx = TurnContext {
        session_id: session_id.clone(),
        turn_index,
        user_text: request.user_text.clone(),
        history,
        context_refs,
        constraints,
        pending_confirmation: session.pending_confirmation.clone(),
    };

    let decision = state.reasoner.decide(ctx).await?;

    // Bookkeeping from the untrusted decision. Unknown refs degrade to
    // logged misses and never fail the turn.
    let touched = apply_effects(&mut session, &decision.effects, turn_index);

    for step in &decision.step_results {
        state.jobs.emit(
            job_id,
            JobEvent::Step {
                job_id: *job_id,
                step: step.clone(),
            },
        );
    }
    state.jobs.emit(
        job_id,
        JobEvent::Assistant {
            job_id: *job_id,
            text: decision.assistant_text.clone(),
        },
    );

    if let Some(curation) = &decision.curation {
        let outcome = apply_curation(&mut session.entities, curation, turn_index);
        TraceEvent::CurationApplied {
            session_id: session_id.clone(),
            retained: outcome.retained.len(),
            demoted: outcome.demoted.len(),
            dropped: outcome.dropped.len(),
            cleared_all: outcome.cleared_all,
            unknown_refs: outcome.unknown_refs.len(),
        }
        .emit();
    }

    for update in &decision.constraints {
        session.set_constraint(
            update.name.as_str(),
            update.value.clone(),
            turn_index,
            update.expires_in_turns,
        );
    }
    // `None` clears any outstanding question.
    session.pending_confirmation = decision.pending_confirmation.clone();

    let mut turn = Turn::new(
        turn_index,
        request.user_text.clone(),
        decision.assistant_text.clone(),
        decision.decision_kind,
    );
    turn.entities_touched = touched.clone();
    turn.step_results = decision.step_results.clone();
    session.history.append(turn);

    // The single durable write of the turn.
    state.sessions.commit(&mut session).await?;

    Ok(TurnOutcome {
        turn_index,
        assistant_text: decision.assistant_text,
        decision_kind: decision.decision_kind,
        entities_touched: touched,
        step_results: decision.step_results,
        pending_confirmation: decision.pending_confirmation,
    })
}

/// Fold the decision's effects into the working copy, in order. Returns
/// the callsigns touched this turn, first mention first.
fn apply_effects(
    session: &mut SessionState,
    effects: &[EntityEffect],
    turn_index: u32,
) -> Vec<String> {
    let mut touched: Vec<String> = Vec::new();
    let session_id = session.session_id.clone();

    let mut miss = |ref_token: &str| {
        tracing::warn!(session_id = %session_id, ref_token, "effect names an unknown ref");
        TraceEvent::RefTranslationMiss {
            session_id: session_id.clone(),
            ref_token: ref_token.to_string(),
        }
        .emit();
    };

    for effect in effects {
        match effect {
            EntityEffect::Record {
                internal_id,
                kind,
                label,
                lifecycle,
            } => match session
                .entities
                .register(internal_id, kind, label, *lifecycle, turn_index)
            {
                Ok(token) => touched.push(token),
                Err(e) => {
                    tracing::warn!(session_id = %session_id, internal_id, error = %e, "record effect rejected")
                }
            },
            EntityEffect::Generate {
                kind,
                label,
                content,
            } => {
                // Draft content has no durable id yet; mint one so the
                // callsign machinery treats it like everything else.
                let draft_id = format!("draft-{}", Uuid::new_v4());
                match session.entities.register(
                    &draft_id,
                    kind,
                    label,
                    LifecycleState::Generated,
                    turn_index,
                ) {
                    Ok(token) => {
                        session.drafts.insert(token.clone(), content.clone());
                        touched.push(token);
                    }
                    Err(e) => {
                        tracing::warn!(session_id = %session_id, kind, error = %e, "generate effect rejected")
                    }
                }
            }
            EntityEffect::Promote {
                gen_ref,
                internal_id,
            } => match session.entities.promote(gen_ref, internal_id, turn_index) {
                Ok(token) => {
                    // The content now lives behind the durable id.
                    session.drafts.remove(gen_ref);
                    touched.push(token);
                }
                Err(_) => miss(gen_ref),
            },
            EntityEffect::Touch { ref_token } => {
                match session.entities.touch(ref_token, turn_index) {
                    Ok(()) => touched.push(ref_token.clone()),
                    Err(_) => miss(ref_token),
                }
            }
        }
    }

    let mut seen = HashSet::new();
    touched.retain(|t| seen.insert(t.clone()));
    touched
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::admission::SessionGate;
    use crate::runtime::jobs::{JobStatus, JobStore};

    use std::collections::VecDeque;
    use std::path::Path;
    use std::sync::Arc;

    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::json;

    use cs_collab::{
        ConstraintUpdate, Decision, DecisionKind, PendingConfirmation, SummaryRequest, Summarizer,
        TurnReasoner,
    };
    use cs_domain::config::Config;
    use cs_sessions::SessionStateStore;

    // ── test doubles ────────────────────────────────────────────────

    struct ScriptedReasoner {
        decisions: Mutex<VecDeque<Decision>>,
        seen: Mutex<Vec<TurnContext>>,
    }

    impl ScriptedReasoner {
        fn new(decisions: Vec<Decision>) -> Self {
            Self {
                decisions: Mutex::new(decisions.into()),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl TurnReasoner for ScriptedReasoner {
        async fn decide(&self, ctx: TurnContext) -> Result<Decision> {
            self.seen.lock().push(ctx);
            self.decisions.lock().pop_front().ok_or_else(|| {
                Error::Collaborator {
                    endpoint: "/v1/decide".into(),
                    message: "script exhausted".into(),
                }
            })
        }
    }

    struct FailingReasoner;

    #[async_trait]
    impl TurnReasoner for FailingReasoner {
        async fn decide(&self, _ctx: TurnContext) -> Result<Decision> {
            Err(Error::Http("connection refused".into()))
        }
    }

    struct SlowReasoner;

    #[async_trait]
    impl TurnReasoner for SlowReasoner {
        async fn decide(&self, _ctx: TurnContext) -> Result<Decision> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(decision("too late"))
        }
    }

    struct EchoSummarizer;

    #[async_trait]
    impl Summarizer for EchoSummarizer {
        async fn summarize(&self, req: SummaryRequest) -> Result<String> {
            Ok(format!("[folded {} chars]", req.text.len()))
        }
    }

    // ── helpers ─────────────────────────────────────────────────────

    fn decision(text: &str) -> Decision {
        Decision {
            assistant_text: text.into(),
            decision_kind: DecisionKind::Execute,
            effects: Vec::new(),
            curation: None,
            constraints: Vec::new(),
            pending_confirmation: None,
            step_results: Vec::new(),
        }
    }

    fn state_with(dir: &Path, reasoner: Arc<dyn TurnReasoner>) -> AppState {
        let mut config = Config::default();
        config.sessions.state_dir = dir.join("sessions");
        config.jobs.log_file = dir.join("jobs.jsonl");
        let config = Arc::new(config);
        AppState {
            sessions: Arc::new(SessionStateStore::new(&config.sessions).unwrap()),
            jobs: Arc::new(JobStore::new(&config.jobs)),
            gate: Arc::new(SessionGate::new()),
            summarizer: Arc::new(EchoSummarizer),
            reasoner,
            config,
        }
    }

    fn request(session: &str, text: &str) -> TurnRequest {
        TurnRequest {
            session_id: session.into(),
            user_text: text.into(),
        }
    }

    async fn wait_terminal(jobs: &JobStore, job_id: &Uuid) -> Job {
        for _ in 0..300 {
            if let Some(job) = jobs.get(job_id) {
                if job.status.is_terminal() {
                    return job;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("job never reached a terminal status");
    }

    // ── tests ───────────────────────────────────────────────────────

    #[tokio::test]
    async fn turn_round_trip_commits_once_and_completes() {
        let dir = tempfile::tempdir().unwrap();
        let reasoner = Arc::new(ScriptedReasoner::new(vec![Decision {
            effects: vec![EntityEffect::Record {
                internal_id: "rec-550e8400".into(),
                kind: "recipe".into(),
                label: "Pasta Carbonara".into(),
                lifecycle: LifecycleState::Read,
            }],
            constraints: vec![ConstraintUpdate {
                name: "servings".into(),
                value: json!(4),
                expires_in_turns: None,
            }],
            ..decision("Here is the recipe.")
        }]));
        let state = state_with(dir.path(), reasoner.clone());

        let job = submit_turn(&state, request("s1", "show me the carbonara")).unwrap();
        assert_eq!(job.status, JobStatus::Pending);

        let done = wait_terminal(&state.jobs, &job.job_id).await;
        assert_eq!(done.status, JobStatus::Complete);
        let outcome = done.output.unwrap();
        assert_eq!(outcome.turn_index, 1);
        assert_eq!(outcome.assistant_text, "Here is the recipe.");
        assert_eq!(outcome.entities_touched, vec!["recipe_1"]);

        // The reasoner saw callsigns and a first-turn context.
        let seen = reasoner.seen.lock();
        assert_eq!(seen[0].turn_index, 1);
        assert!(seen[0].history.is_empty());

        // Committed: one turn, one entity, the constraint pinned.
        let session = state.sessions.load("s1").await.unwrap().unwrap();
        assert_eq!(session.history.turn_count(), 1);
        assert_eq!(session.entities.len(), 1);
        assert_eq!(session.constraints["servings"].value, json!(4));
    }

    #[tokio::test]
    async fn reasoner_failure_fails_the_job_without_commit() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_with(dir.path(), Arc::new(FailingReasoner));

        let job = submit_turn(&state, request("s1", "hello")).unwrap();
        let done = wait_terminal(&state.jobs, &job.job_id).await;

        assert_eq!(done.status, JobStatus::Failed);
        assert!(done.error.unwrap().contains("connection refused"));
        // Nothing was committed for the session.
        assert!(state.sessions.load("s1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn busy_session_rejects_without_a_job_record() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_with(dir.path(), Arc::new(ScriptedReasoner::new(vec![])));

        let _held = state.gate.try_admit("s1").unwrap();
        let err = submit_turn(&state, request("s1", "hello")).unwrap_err();
        assert!(matches!(err, Error::SessionBusy { .. }));
        assert!(state.jobs.is_empty());

        // Another session is unaffected.
        assert!(submit_turn(&state, request("s2", "hello")).is_ok());
    }

    #[tokio::test]
    async fn timeout_fails_the_job_and_reopens_the_session() {
        let dir = tempfile::tempdir().unwrap();
        let mut state = state_with(dir.path(), Arc::new(SlowReasoner));
        {
            let config = Arc::make_mut(&mut state.config);
            config.jobs.turn_timeout_secs = 1;
        }

        let job = submit_turn(&state, request("s1", "hello")).unwrap();
        let done = wait_terminal(&state.jobs, &job.job_id).await;

        assert_eq!(done.status, JobStatus::Failed);
        assert!(done.error.unwrap().contains("1s limit"));

        // The admission permit was released with the task.
        assert!(state.gate.try_admit("s1").is_ok());
    }

    #[tokio::test]
    async fn generated_content_promotes_into_a_durable_ref() {
        let dir = tempfile::tempdir().unwrap();
        let reasoner = Arc::new(ScriptedReasoner::new(vec![
            Decision {
                effects: vec![EntityEffect::Generate {
                    kind: "recipe".into(),
                    label: "Improvised Tacos".into(),
                    content: json!({"steps": ["warm tortillas"]}),
                }],
                ..decision("Drafted a taco recipe.")
            },
            Decision {
                effects: vec![EntityEffect::Promote {
                    gen_ref: "gen_recipe_1".into(),
                    internal_id: "rec-42".into(),
                }],
                ..decision("Saved it.")
            },
        ]));
        let state = state_with(dir.path(), reasoner);

        let first = execute_turn(&state, &Uuid::new_v4(), &request("s1", "improvise"))
            .await
            .unwrap();
        assert_eq!(first.entities_touched, vec!["gen_recipe_1"]);
        let session = state.sessions.load("s1").await.unwrap().unwrap();
        assert!(session.drafts.contains_key("gen_recipe_1"));

        let second = execute_turn(&state, &Uuid::new_v4(), &request("s1", "save it"))
            .await
            .unwrap();
        assert_eq!(second.entities_touched, vec!["recipe_1"]);
        let session = state.sessions.load("s1").await.unwrap().unwrap();
        assert!(session.drafts.is_empty());
        assert_eq!(session.entities.len(), 2);
    }

    #[tokio::test]
    async fn unknown_refs_degrade_to_misses() {
        let dir = tempfile::tempdir().unwrap();
        let reasoner = Arc::new(ScriptedReasoner::new(vec![Decision {
            effects: vec![
                EntityEffect::Touch {
                    ref_token: "recipe_99".into(),
                },
                EntityEffect::Promote {
                    gen_ref: "gen_recipe_7".into(),
                    internal_id: "rec-1".into(),
                },
            ],
            ..decision("Sure.")
        }]));
        let state = state_with(dir.path(), reasoner);

        let outcome = execute_turn(&state, &Uuid::new_v4(), &request("s1", "touch them"))
            .await
            .unwrap();

        // Misses are dropped from the touched list, the turn still lands.
        assert!(outcome.entities_touched.is_empty());
        let session = state.sessions.load("s1").await.unwrap().unwrap();
        assert_eq!(session.history.turn_count(), 1);
    }

    #[tokio::test]
    async fn pending_confirmation_carries_over_and_clears() {
        let dir = tempfile::tempdir().unwrap();
        let reasoner = Arc::new(ScriptedReasoner::new(vec![
            Decision {
                decision_kind: DecisionKind::Propose,
                pending_confirmation: Some(PendingConfirmation {
                    question: "Replace the planned dinner?".into(),
                    refs: vec![],
                }),
                ..decision("I can swap it.")
            },
            decision("Swapped."),
        ]));
        let state = state_with(dir.path(), reasoner.clone());

        execute_turn(&state, &Uuid::new_v4(), &request("s1", "swap dinner"))
            .await
            .unwrap();
        let session = state.sessions.load("s1").await.unwrap().unwrap();
        assert!(session.pending_confirmation.is_some());

        execute_turn(&state, &Uuid::new_v4(), &request("s1", "yes"))
            .await
            .unwrap();

        // The follow-up turn saw the open question; the decision cleared it.
        let seen = reasoner.seen.lock();
        assert_eq!(
            seen[1].pending_confirmation.as_ref().unwrap().question,
            "Replace the planned dinner?"
        );
        let session = state.sessions.load("s1").await.unwrap().unwrap();
        assert!(session.pending_confirmation.is_none());
    }

    #[tokio::test]
    async fn constraints_expire_between_turns() {
        let dir = tempfile::tempdir().unwrap();
        let reasoner = Arc::new(ScriptedReasoner::new(vec![
            Decision {
                constraints: vec![ConstraintUpdate {
                    name: "guests".into(),
                    value: json!(6),
                    expires_in_turns: Some(1),
                }],
                ..decision("Noted, six guests.")
            },
            decision("Still six."),
            decision("Back to normal."),
        ]));
        let state = state_with(dir.path(), reasoner.clone());

        for text in ["six guests tonight", "what else", "and now"] {
            execute_turn(&state, &Uuid::new_v4(), &request("s1", text))
                .await
                .unwrap();
        }

        let seen = reasoner.seen.lock();
        // Pinned at turn 1, applies through turn 2, gone by turn 3.
        assert!(!seen[0].constraints.contains_key("guests"));
        assert_eq!(seen[1].constraints["guests"], json!(6));
        assert!(!seen[2].constraints.contains_key("guests"));
    }
}
