//! `callsign turn` — one-shot turn command.
//!
//! Submits a single turn for a session, prints step progress to stderr
//! and the assistant's reply to stdout, and exits.  Useful for
//! scripting, piping, and quick CLI interactions.

use std::sync::Arc;

use cs_domain::config::Config;
use tokio::sync::broadcast::error::RecvError;

use crate::bootstrap;
use crate::runtime::jobs::{Job, JobEvent, JobStatus, TurnRequest};
use crate::runtime::turn;

/// Execute a single turn and print the outcome.
///
/// This is the entry point for `callsign turn "message"`.
pub async fn run(
    config: Arc<Config>,
    message: String,
    session_id: String,
    json_output: bool,
) -> anyhow::Result<()> {
    // 1. Boot the full runtime (without background tasks).
    let state = bootstrap::build_app_state(config)?;

    // 2. Submit the turn and subscribe to its event channel.
    let job = turn::submit_turn(
        &state,
        TurnRequest {
            session_id: session_id.clone(),
            user_text: message,
        },
    )?;
    let mut rx = state.jobs.subscribe(&job.job_id);

    // 3. Drain events until the job finishes.  If the job raced ahead
    //    and already closed its channel, fall back to the stored row.
    let finished: Job = loop {
        match rx.recv().await {
            Ok(JobEvent::Step { step, .. }) => {
                if !json_output {
                    let mark = if step.ok { "ok" } else { "failed" };
                    eprintln!("\x1b[2m[{} {mark}] {}\x1b[0m", step.name, step.summary);
                }
            }
            Ok(JobEvent::Done { job, .. }) => break *job,
            Ok(_) => {}
            Err(RecvError::Lagged(_)) => continue,
            Err(RecvError::Closed) => match state.jobs.get(&job.job_id) {
                Some(row) => break row,
                None => anyhow::bail!("job {} disappeared before finishing", job.job_id),
            },
        }
    };

    // 4. Print the final outcome.
    match finished.status {
        JobStatus::Complete => {
            let outcome = finished
                .output
                .ok_or_else(|| anyhow::anyhow!("completed job carried no outcome"))?;
            if json_output {
                println!("{}", serde_json::to_string_pretty(&outcome)?);
            } else {
                println!("{}", outcome.assistant_text);
                if let Some(pending) = &outcome.pending_confirmation {
                    eprintln!("\x1b[2m[awaiting confirmation: {}]\x1b[0m", pending.question);
                }
            }
        }
        _ => {
            let reason = finished
                .error
                .unwrap_or_else(|| "turn did not complete".into());
            eprintln!("error: {reason}");
            std::process::exit(1);
        }
    }

    Ok(())
}
