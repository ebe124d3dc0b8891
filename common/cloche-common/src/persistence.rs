//! The `PersistenceStore` abstraction (spec §4.6): how runs and captures are
//! durably recorded. Generalizes the teacher's `Database` (`agent/src/db/mod.rs`)
//! and its run CRUD (`agent/src/db/runs.rs`), widened to cover captures as a
//! separate append-only stream rather than embedding them in the run row.

use std::path::Path;

use async_trait::async_trait;
use thiserror::Error;

use crate::id::RunId;
use crate::run::{Capture, CapturePhase, Run, RunState};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("run {0} not found")]
    RunNotFound(RunId),
    #[error("database error: {0}")]
    Database(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Durable storage for runs and their captures. The daemon is the only
/// caller; the engine and adapters know nothing about persistence.
#[async_trait]
pub trait PersistenceStore: Send + Sync {
    async fn create_run(&self, run: &Run) -> Result<(), StoreError>;

    async fn update_run_state(
        &self,
        run_id: &RunId,
        state: RunState,
        error: Option<&str>,
    ) -> Result<(), StoreError>;

    async fn set_active_steps(
        &self,
        run_id: &RunId,
        active_steps: &[String],
    ) -> Result<(), StoreError>;

    async fn append_capture(&self, capture: &Capture) -> Result<(), StoreError>;

    async fn get_run(&self, run_id: &RunId) -> Result<Run, StoreError>;

    async fn list_runs(&self) -> Result<Vec<Run>, StoreError>;

    async fn list_captures(&self, run_id: &RunId) -> Result<Vec<Capture>, StoreError>;

    /// Mark every run not already in a terminal state as `Failed`. Called
    /// once at daemon startup, since no run can legitimately still be
    /// in-flight across a process restart (spec Non-goals: no resume).
    async fn fail_all_incomplete_runs(&self, reason: &str) -> Result<(), StoreError>;

    /// Runs for `(project_dir, workflow_name)` started after `since_run_id`,
    /// oldest first (spec §4.6: "for post-hoc analysis, list runs since a
    /// given run id in a project+workflow scope"). The only caller named in
    /// the spec is the evolution meta-pipeline, which is out of scope here —
    /// this method exists so the persistence contract is complete even
    /// though nothing in this workspace calls it yet.
    async fn list_runs_since(
        &self,
        project_dir: &Path,
        workflow_name: &str,
        since_run_id: &RunId,
    ) -> Result<Vec<Run>, StoreError>;
}

/// Builds the two rows a single step observation produces — the helper
/// every `PersistenceStore` caller uses instead of constructing `Capture`
/// values by hand.
pub fn started_capture(run_id: RunId, step_name: impl Into<String>, prompt_text: Option<String>) -> Capture {
    Capture {
        id: 0,
        run_id,
        step_name: step_name.into(),
        phase: CapturePhase::Started,
        prompt_text,
        started_at: Some(chrono::Utc::now()),
        completed_at: None,
        result: None,
        agent_output: None,
        attempt_number: None,
        script_logs: None,
    }
}

#[allow(clippy::too_many_arguments)]
pub fn completed_capture(
    run_id: RunId,
    step_name: impl Into<String>,
    result: impl Into<String>,
    agent_output: Option<String>,
    attempt_number: u32,
    script_logs: Option<String>,
) -> Capture {
    Capture {
        id: 0,
        run_id,
        step_name: step_name.into(),
        phase: CapturePhase::Completed,
        prompt_text: None,
        started_at: None,
        completed_at: Some(chrono::Utc::now()),
        result: Some(result.into()),
        agent_output,
        attempt_number: Some(attempt_number),
        script_logs,
    }
}
