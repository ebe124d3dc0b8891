//! Run, step-execution, and capture records (spec §3).

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::RunId;

/// Lifecycle state of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Pending,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl RunState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RunState::Succeeded | RunState::Failed | RunState::Cancelled
        )
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RunState::Pending => "pending",
            RunState::Running => "running",
            RunState::Succeeded => "succeeded",
            RunState::Failed => "failed",
            RunState::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for RunState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(RunState::Pending),
            "running" => Ok(RunState::Running),
            "succeeded" => Ok(RunState::Succeeded),
            "failed" => Ok(RunState::Failed),
            "cancelled" => Ok(RunState::Cancelled),
            other => Err(format!("unknown run state: {other}")),
        }
    }
}

/// A run of one workflow against one project directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    pub id: RunId,
    pub workflow_name: String,
    pub project_dir: PathBuf,
    pub state: RunState,
    /// Step names currently in flight, in launch order.
    pub active_steps: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl Run {
    pub fn pending(id: RunId, workflow_name: impl Into<String>, project_dir: PathBuf) -> Self {
        Self {
            id,
            workflow_name: workflow_name.into(),
            project_dir,
            state: RunState::Pending,
            active_steps: Vec::new(),
            started_at: Utc::now(),
            completed_at: None,
            error: None,
        }
    }
}

/// Which half of a step observation a `Capture` row records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapturePhase {
    Started,
    Completed,
}

/// One persisted observation of a step starting or completing. Exactly two
/// rows are written per step execution (spec §3, "Capture and persistence").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Capture {
    /// Insertion-order sequence number, assigned by the store.
    pub id: i64,
    pub run_id: RunId,
    pub step_name: String,
    pub phase: CapturePhase,
    pub prompt_text: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub result: Option<String>,
    pub agent_output: Option<String>,
    pub attempt_number: Option<u32>,
    pub script_logs: Option<String>,
}

/// A merged started+completed view of one step's execution, used for the
/// `GetStatus`/`StreamLogs` RPC responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepExecution {
    pub step_name: String,
    /// Empty while the step is still in flight.
    pub result: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub prompt_text: Option<String>,
    pub agent_output: Option<String>,
    pub attempt_number: Option<u32>,
    pub script_logs: Option<String>,
}

/// Merge a run's raw capture rows (in insertion order) into one
/// `StepExecution` per started/completed pair. A started capture with no
/// matching completed capture yields a still-in-flight `StepExecution`.
pub fn merge_captures(captures: &[Capture]) -> Vec<StepExecution> {
    let mut executions: Vec<StepExecution> = Vec::new();

    for capture in captures {
        match capture.phase {
            CapturePhase::Started => {
                executions.push(StepExecution {
                    step_name: capture.step_name.clone(),
                    result: None,
                    started_at: capture.started_at.unwrap_or_else(Utc::now),
                    completed_at: None,
                    prompt_text: capture.prompt_text.clone(),
                    agent_output: None,
                    attempt_number: None,
                    script_logs: None,
                });
            }
            CapturePhase::Completed => {
                if let Some(exec) = executions
                    .iter_mut()
                    .rev()
                    .find(|e| e.step_name == capture.step_name && e.result.is_none())
                {
                    exec.result = capture.result.clone();
                    exec.completed_at = capture.completed_at;
                    exec.agent_output = capture.agent_output.clone();
                    exec.attempt_number = capture.attempt_number;
                    exec.script_logs = capture.script_logs.clone();
                } else {
                    // A completed capture with no pending started capture
                    // (shouldn't normally happen); record it standalone.
                    executions.push(StepExecution {
                        step_name: capture.step_name.clone(),
                        result: capture.result.clone(),
                        started_at: capture.completed_at.unwrap_or_else(Utc::now),
                        completed_at: capture.completed_at,
                        prompt_text: None,
                        agent_output: capture.agent_output.clone(),
                        attempt_number: capture.attempt_number,
                        script_logs: capture.script_logs.clone(),
                    });
                }
            }
        }
    }

    executions
}

#[cfg(test)]
mod tests {
    use super::*;

    fn started(step: &str, seq: i64) -> Capture {
        Capture {
            id: seq,
            run_id: RunId::new("run-1"),
            step_name: step.to_string(),
            phase: CapturePhase::Started,
            prompt_text: Some("do it".to_string()),
            started_at: Some(Utc::now()),
            completed_at: None,
            result: None,
            agent_output: None,
            attempt_number: None,
            script_logs: None,
        }
    }

    fn completed(step: &str, seq: i64, result: &str) -> Capture {
        Capture {
            id: seq,
            run_id: RunId::new("run-1"),
            step_name: step.to_string(),
            phase: CapturePhase::Completed,
            prompt_text: None,
            started_at: None,
            completed_at: Some(Utc::now()),
            result: Some(result.to_string()),
            agent_output: Some("done".to_string()),
            attempt_number: Some(1),
            script_logs: None,
        }
    }

    #[test]
    fn merges_started_and_completed_pairs() {
        let captures = vec![started("build", 1), completed("build", 2, "success")];
        let merged = merge_captures(&captures);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].result.as_deref(), Some("success"));
    }

    #[test]
    fn retry_loop_produces_one_execution_per_attempt() {
        let captures = vec![
            started("check", 1),
            completed("check", 2, "fail"),
            started("check", 3),
            completed("check", 4, "pass"),
        ];
        let merged = merge_captures(&captures);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].result.as_deref(), Some("fail"));
        assert_eq!(merged[1].result.as_deref(), Some("pass"));
    }

    #[test]
    fn in_flight_step_has_no_result() {
        let captures = vec![started("build", 1)];
        let merged = merge_captures(&captures);
        assert_eq!(merged.len(), 1);
        assert!(merged[0].result.is_none());
    }
}
