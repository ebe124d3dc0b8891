//! Translates adapter-level [`StepObserver`] callbacks into [`StatusMessage`]
//! values on an internal channel, mirroring the teacher's `AgentEvent`
//! `mpsc::unbounded_channel()` pattern (`agent/src/agent/events.rs`) but
//! feeding the runner's own stdout writer loop instead of an in-process
//! subscriber.

use async_trait::async_trait;
use chrono::Utc;
use cloche_common::{RunId, StatusMessage, StepObserver};
use tokio::sync::mpsc::UnboundedSender;

pub struct StatusObserver {
    pub run_id: RunId,
    pub tx: UnboundedSender<StatusMessage>,
}

#[async_trait]
impl StepObserver for StatusObserver {
    async fn step_started(&self, step_name: &str, prompt_text: Option<String>) {
        let _ = self.tx.send(StatusMessage::StepStarted {
            run_id: self.run_id.clone(),
            step_name: step_name.to_string(),
            prompt_text,
            timestamp: Utc::now(),
        });
    }

    async fn step_completed(
        &self,
        step_name: &str,
        result: &str,
        agent_output: Option<String>,
        attempt_number: u32,
        script_logs: Option<String>,
    ) {
        let _ = self.tx.send(StatusMessage::StepCompleted {
            run_id: self.run_id.clone(),
            step_name: step_name.to_string(),
            result: result.to_string(),
            agent_output,
            attempt_number,
            script_logs,
            timestamp: Utc::now(),
        });
    }
}
