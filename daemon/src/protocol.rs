//! The daemon's RPC wire protocol (spec §4.6, §6.4 supplemental): one JSON
//! object per line over a Unix domain socket, directly generalizing the
//! teacher's `DaemonRequest`/`DaemonResponse` tagged enums
//! (`agent/src/mcps/protocol.rs`) from MCP-server supervision to
//! workflow-run supervision.

use std::path::PathBuf;

use cloche_common::{Capture, Run, RunId, RunState, StepExecution};
use serde::{Deserialize, Serialize};

/// A request from a client to the daemon.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DaemonRequest {
    /// Start a run of `workflow_name` against `project_dir`, with an
    /// optional user prompt.
    RunWorkflow {
        project_dir: PathBuf,
        workflow_name: String,
        prompt: Option<String>,
    },
    /// All known runs, most-recent-started first.
    ListRuns,
    /// The run header plus its merged step executions.
    GetStatus { run_id: RunId },
    /// One `LogEntry` per stored capture, in insertion order, followed by a
    /// `RunCompleted` entry if the run is in a terminal state.
    StreamLogs { run_id: RunId },
    /// Stop an in-flight run.
    StopRun { run_id: RunId },
}

/// One line the daemon writes back. `StreamLogs` is the only request that
/// produces more than one of these on a single connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DaemonResponse {
    RunStarted { run_id: RunId },
    Runs { runs: Vec<Run> },
    Status { run: Run, steps: Vec<StepExecution> },
    LogEntry { capture: Capture },
    RunCompleted { state: RunState },
    Ok,
    Error { message: String },
}

impl DaemonResponse {
    pub fn error(message: impl Into<String>) -> Self {
        DaemonResponse::Error { message: message.into() }
    }
}
