//! Script and prompt step adapters (spec §4.4, §4.5), unified behind one
//! [`cloche_engine::StepExecutor`] implementation the runner hands to the
//! engine.
//!
//! The engine's `StepExecutor::execute` only ever returns a declared result
//! name — it has no notion of prompts, subprocess output, or attempt
//! counters. [`AdapterExecutor`] reports that richer, adapter-specific half
//! of each observation through a [`cloche_common::StepObserver`] instead,
//! which the runner implements to emit the §6.2 status-stream lines.

pub mod error;
pub mod prompt;
pub mod script;

pub use error::AdapterError;
pub use prompt::{PromptAdapter, PromptOutcome, DEFAULT_AGENT_COMMAND, GIVE_UP_RESULT};
pub use script::{ScriptAdapter, ScriptOutcome};

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use cloche_common::workflow::{Step, StepKind};
use cloche_common::{RunId, StepObserver};
use cloche_engine::{StepExecutionError, StepExecutor};

/// Wires the script/prompt adapters into the engine's `StepExecutor` seam,
/// dispatching on `step.kind` and reporting each step's lifecycle to a
/// `StepObserver`.
pub struct AdapterExecutor {
    script: ScriptAdapter,
    prompt: PromptAdapter,
    observer: Arc<dyn StepObserver>,
}

impl AdapterExecutor {
    pub fn new(
        workdir: impl Into<PathBuf>,
        run_id: Option<RunId>,
        env_agent_command: Option<String>,
        workflow_agent_command: Option<String>,
        observer: Arc<dyn StepObserver>,
    ) -> Self {
        let workdir = workdir.into();
        Self {
            script: ScriptAdapter::new(workdir.clone()),
            prompt: PromptAdapter {
                workdir,
                run_id,
                env_agent_command,
                workflow_agent_command,
            },
            observer,
        }
    }
}

#[async_trait]
impl StepExecutor for AdapterExecutor {
    async fn execute(&self, step: &Step) -> Result<String, StepExecutionError> {
        match step.kind {
            StepKind::Script => {
                self.observer.step_started(&step.name, None).await;
                let outcome = self.script.run(step).await.map_err(|err| StepExecutionError::Failed {
                    step: step.name.clone(),
                    reason: err.to_string(),
                })?;
                self.observer
                    .step_completed(&step.name, &outcome.result, None, 1, Some(outcome.logs))
                    .await;
                Ok(outcome.result)
            }
            StepKind::Agent => {
                // The prompt adapter reports `step_started` itself, once the
                // prompt is assembled but before the LLM command is spawned,
                // so a long-running invocation shows as in flight rather
                // than being reported alongside its own completion.
                let outcome = self
                    .prompt
                    .run(step, self.observer.as_ref())
                    .await
                    .map_err(|err| StepExecutionError::Failed {
                        step: step.name.clone(),
                        reason: err.to_string(),
                    })?;
                self.observer
                    .step_completed(
                        &step.name,
                        &outcome.result,
                        outcome.agent_output,
                        outcome.attempt_number,
                        None,
                    )
                    .await;
                Ok(outcome.result)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cloche_common::workflow::StepKind;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingObserver {
        started: Mutex<Vec<(String, Option<String>)>>,
        completed: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl StepObserver for RecordingObserver {
        async fn step_started(&self, step_name: &str, prompt_text: Option<String>) {
            self.started.lock().unwrap().push((step_name.to_string(), prompt_text));
        }

        async fn step_completed(
            &self,
            step_name: &str,
            result: &str,
            _agent_output: Option<String>,
            _attempt_number: u32,
            _script_logs: Option<String>,
        ) {
            self.completed
                .lock()
                .unwrap()
                .push((step_name.to_string(), result.to_string()));
        }
    }

    fn script_step(name: &str, run: &str, results: &[&str]) -> Step {
        let mut config = HashMap::new();
        config.insert("run".to_string(), run.to_string());
        Step {
            name: name.to_string(),
            kind: StepKind::Script,
            results: results.iter().map(|s| s.to_string()).collect(),
            config,
        }
    }

    #[tokio::test]
    async fn script_step_reports_started_and_completed() {
        let dir = tempfile::tempdir().unwrap();
        let observer = Arc::new(RecordingObserver::default());
        let executor = AdapterExecutor::new(dir.path(), None, None, None, observer.clone());

        let result = executor.execute(&script_step("build", "echo ok", &["success"])).await.unwrap();
        assert_eq!(result, "success");
        assert_eq!(observer.started.lock().unwrap().len(), 1);
        assert_eq!(observer.completed.lock().unwrap()[0].1, "success");
    }

    fn agent_step(name: &str, prompt: &str, results: &[&str]) -> Step {
        let mut config = HashMap::new();
        config.insert("prompt".to_string(), prompt.to_string());
        config.insert(
            "agent_command".to_string(),
            "echo CLOCHE_RESULT:success".to_string(),
        );
        Step {
            name: name.to_string(),
            kind: StepKind::Agent,
            results: results.iter().map(|s| s.to_string()).collect(),
            config,
        }
    }

    #[tokio::test]
    async fn agent_step_reports_started_with_the_assembled_prompt_before_completing() {
        let dir = tempfile::tempdir().unwrap();
        let observer = Arc::new(RecordingObserver::default());
        let executor = AdapterExecutor::new(dir.path(), None, None, None, observer.clone());

        let result = executor.execute(&agent_step("code", "write code", &["success", "fail"])).await.unwrap();
        assert_eq!(result, "success");

        let started = observer.started.lock().unwrap();
        assert_eq!(started.len(), 1);
        assert!(started[0].1.as_ref().unwrap().contains("write code"));
        assert_eq!(observer.completed.lock().unwrap()[0].1, "success");
    }
}
