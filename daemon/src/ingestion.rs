//! The ingestion task (spec §4.6): reads a runner instance's status stream
//! line by line, persists a run-state update and/or a capture row for each
//! message, and determines the terminal state once the stream closes.
//! Corrupt lines are skipped rather than crashing ingestion (spec §6.2);
//! persistence failures are logged and ingestion continues where possible
//! (spec §7 `PersistenceError`).

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use cloche_common::persistence::{completed_capture, started_capture};
use cloche_common::{InstanceId, RunId, RunState, StatusMessage};

use crate::history;
use crate::supervisor::DaemonState;

pub async fn run(
    state: Arc<DaemonState>,
    run_id: RunId,
    instance_id: InstanceId,
    project_dir: PathBuf,
    workflow_name: String,
    mut source: Box<dyn cloche_common::StatusSource>,
) {
    let mut active_steps: Vec<String> = Vec::new();
    let mut terminal_state: Option<RunState> = None;

    loop {
        let line = match source.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(err) => {
                tracing::warn!(run_id = %run_id, error = %err, "status stream read failed, ending ingestion");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let message = match StatusMessage::parse_line(&line) {
            Ok(message) => message,
            Err(err) => {
                tracing::warn!(run_id = %run_id, error = %err, line = %line, "skipping unparseable status line");
                continue;
            }
        };

        match message {
            StatusMessage::Log { message, .. } => {
                tracing::info!(run_id = %run_id, message = %message, "runner log");
            }
            StatusMessage::Error { message, .. } => {
                tracing::warn!(run_id = %run_id, message = %message, "runner error");
            }
            StatusMessage::StepStarted { step_name, prompt_text, .. } => {
                active_steps.push(step_name.clone());
                report(state.store.set_active_steps(&run_id, &active_steps).await, &run_id, "set_active_steps");
                let capture = started_capture(run_id.clone(), step_name, prompt_text);
                report(state.store.append_capture(&capture).await, &run_id, "append_capture(started)");
            }
            StatusMessage::StepCompleted {
                step_name,
                result,
                agent_output,
                attempt_number,
                script_logs,
                ..
            } => {
                active_steps.retain(|s| s != &step_name);
                report(state.store.set_active_steps(&run_id, &active_steps).await, &run_id, "set_active_steps");
                let capture = completed_capture(run_id.clone(), step_name, result, agent_output, attempt_number, script_logs);
                report(state.store.append_capture(&capture).await, &run_id, "append_capture(completed)");
            }
            StatusMessage::RunCompleted { result: result_str, error, .. } => {
                let run_state = RunState::from_str(&result_str).unwrap_or(RunState::Failed);
                report(
                    state.store.update_run_state(&run_id, run_state, error.as_deref()).await,
                    &run_id,
                    "update_run_state",
                );
                terminal_state = Some(run_state);
            }
        }
    }

    let final_state = match terminal_state {
        Some(state_value) => state_value,
        None => {
            let exit_code = source.wait_exit().await.unwrap_or(1);
            let inferred = if exit_code == 0 { RunState::Succeeded } else { RunState::Failed };
            let error = (inferred == RunState::Failed)
                .then(|| format!("runner instance exited with code {exit_code}"));
            report(
                state.store.update_run_state(&run_id, inferred, error.as_deref()).await,
                &run_id,
                "update_run_state(exit-code fallback)",
            );
            inferred
        }
    };

    if let Err(err) = history::append(&project_dir, &run_id, &workflow_name, final_state).await {
        tracing::warn!(run_id = %run_id, error = %err, "failed to append history.log");
    }

    state.forget_instance(&run_id).await;
    tracing::info!(run_id = %run_id, instance = %instance_id, state = %final_state, "ingestion complete");
}

fn report<T>(result: Result<T, cloche_common::StoreError>, run_id: &RunId, what: &str) {
    if let Err(err) = result {
        tracing::warn!(run_id = %run_id, error = %err, what, "persistence error during ingestion");
    }
}
