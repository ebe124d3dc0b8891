//! The status-stream protocol (spec §6.2): JSON-lines messages the runner
//! writes to stdout, one object per line, and the daemon's ingestion task
//! parses and persists. Mirrors the tagged-enum shape of the teacher's
//! `AgentEvent` (`agent/src/agent/events.rs`), but over process stdout
//! instead of an in-process channel.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::RunId;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StatusMessage {
    StepStarted {
        run_id: RunId,
        step_name: String,
        prompt_text: Option<String>,
        timestamp: DateTime<Utc>,
    },
    StepCompleted {
        run_id: RunId,
        step_name: String,
        result: String,
        agent_output: Option<String>,
        attempt_number: u32,
        script_logs: Option<String>,
        timestamp: DateTime<Utc>,
    },
    RunCompleted {
        run_id: RunId,
        result: String,
        error: Option<String>,
        timestamp: DateTime<Utc>,
    },
    Log {
        run_id: RunId,
        message: String,
        timestamp: DateTime<Utc>,
    },
    Error {
        run_id: RunId,
        message: String,
        timestamp: DateTime<Utc>,
    },
}

impl StatusMessage {
    pub fn run_id(&self) -> &RunId {
        match self {
            StatusMessage::StepStarted { run_id, .. } => run_id,
            StatusMessage::StepCompleted { run_id, .. } => run_id,
            StatusMessage::RunCompleted { run_id, .. } => run_id,
            StatusMessage::Log { run_id, .. } => run_id,
            StatusMessage::Error { run_id, .. } => run_id,
        }
    }

    /// Parse one line of the status stream. Blank lines are not valid input;
    /// callers should skip them before calling this.
    pub fn parse_line(line: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(line)
    }

    pub fn to_line(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_a_json_line() {
        let msg = StatusMessage::StepCompleted {
            run_id: RunId::new("run-1"),
            step_name: "build".to_string(),
            result: "success".to_string(),
            agent_output: Some("ok".to_string()),
            attempt_number: 1,
            script_logs: None,
            timestamp: Utc::now(),
        };
        let line = msg.to_line().unwrap();
        assert!(!line.contains('\n'));
        let parsed = StatusMessage::parse_line(&line).unwrap();
        assert_eq!(parsed.run_id().as_str(), "run-1");
    }

    #[test]
    fn tag_field_is_snake_case() {
        let msg = StatusMessage::StepStarted {
            run_id: RunId::new("run-1"),
            step_name: "build".to_string(),
            prompt_text: None,
            timestamp: Utc::now(),
        };
        let line = msg.to_line().unwrap();
        assert!(line.contains("\"type\":\"step_started\""));
    }
}
