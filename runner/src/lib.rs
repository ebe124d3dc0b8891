//! The in-environment runner (spec §4.3): reads a workflow, drives the
//! engine through the script/prompt adapters, and emits the §6.2
//! JSON-lines status stream. One process per run.

pub mod config;
pub mod error;
pub mod observer;
pub mod publish;
pub mod scratch;

pub use config::RunnerConfig;
pub use error::RunnerError;

use std::sync::Arc;

use chrono::Utc;
use cloche_adapters::AdapterExecutor;
use cloche_common::StatusMessage;
use cloche_engine::{EngineEvent, RunResult};
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio_util::sync::CancellationToken;

use observer::StatusObserver;

/// Drives one run to completion, sending status-stream messages on
/// `status_tx` as it goes. The caller owns the paired receiver and is
/// responsible for serializing messages to the actual status writer (stdout
/// for the real binary; an in-memory channel in tests) — keeping the
/// engine/adapter-facing half of the runner free of any I/O-writer generic.
pub async fn run(config: RunnerConfig, status_tx: UnboundedSender<StatusMessage>) -> RunResult {
    let run_id = config.effective_run_id();

    let source = match tokio::fs::read_to_string(&config.workflow_path).await {
        Ok(source) => source,
        Err(source) => {
            let err = RunnerError::ReadWorkflow {
                path: config.workflow_path.display().to_string(),
                source,
            };
            return finish_with_failure(&status_tx, &run_id, err.to_string());
        }
    };

    let workflow = match cloche_dsl::parse_and_validate(&source) {
        Ok(workflow) => workflow,
        Err(err) => return finish_with_failure(&status_tx, &run_id, err.to_string()),
    };

    let _ = status_tx.send(StatusMessage::Log {
        run_id: run_id.clone(),
        message: format!("starting workflow '{}'", workflow.name),
        timestamp: Utc::now(),
    });

    if let Err(err) = scratch::reset(&config.workdir).await {
        return finish_with_failure(&status_tx, &run_id, err.to_string());
    }

    let observer = Arc::new(StatusObserver { run_id: run_id.clone(), tx: status_tx.clone() });
    let executor = Arc::new(AdapterExecutor::new(
        config.workdir.clone(),
        Some(run_id.clone()),
        config.agent_command_env.clone(),
        workflow.config_get("agent_command").map(str::to_string),
        observer,
    ));

    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<EngineEvent>();
    let workflow = Arc::new(workflow);
    tokio::spawn(cloche_engine::run(workflow, executor, event_tx, CancellationToken::new()));

    let result = loop {
        match event_rx.recv().await {
            Some(EngineEvent::RunTerminal { state, error }) => {
                let _ = status_tx.send(StatusMessage::RunCompleted {
                    run_id: run_id.clone(),
                    result: state.to_string(),
                    error: error.clone(),
                    timestamp: Utc::now(),
                });
                break RunResult { state, error };
            }
            Some(_) => continue,
            None => {
                break finish_with_failure(&status_tx, &run_id, "engine event channel closed unexpectedly".to_string());
            }
        }
    };

    if config.run_id.is_some() {
        if let Some(remote) = &config.git_remote {
            publish::publish_result(&config.workdir, &run_id, remote).await;
        }
    }

    result
}

fn finish_with_failure(
    status_tx: &UnboundedSender<StatusMessage>,
    run_id: &cloche_common::RunId,
    error: String,
) -> RunResult {
    let _ = status_tx.send(StatusMessage::RunCompleted {
        run_id: run_id.clone(),
        result: cloche_common::RunState::Failed.to_string(),
        error: Some(error.clone()),
        timestamp: Utc::now(),
    });
    RunResult { state: cloche_common::RunState::Failed, error: Some(error) }
}
