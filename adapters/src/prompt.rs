//! The prompt adapter (spec §4.5): assembles a full prompt for an agent
//! step, pipes it to an external LLM command, and infers a result from the
//! result marker or exit code. Enforces `max_attempts` before ever spawning
//! the LLM.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use cloche_common::workflow::Step;
use cloche_common::{extract_marker, RunId, StepObserver};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;

use crate::error::AdapterError;

/// The built-in LLM command, used when no workflow, step, or environment
/// override is configured (spec §4.5).
pub const DEFAULT_AGENT_COMMAND: &[&str] =
    &["claude", "-p", "--output-format", "text", "--dangerously-skip-permissions"];

/// The literal result returned when `max_attempts` is reached without
/// invoking the LLM (spec §4.5).
pub const GIVE_UP_RESULT: &str = "give-up";

pub struct PromptOutcome {
    pub result: String,
    /// `None` only for the `give-up` short-circuit, which never assembles a
    /// prompt.
    pub prompt_text: Option<String>,
    pub agent_output: Option<String>,
    pub attempt_number: u32,
}

pub struct PromptAdapter {
    pub workdir: PathBuf,
    pub run_id: Option<RunId>,
    /// `AGENT_COMMAND` environment override (spec §6.4) — lowest-precedence
    /// override above the built-in default.
    pub env_agent_command: Option<String>,
    /// Workflow-level `agent_command` config key, if set.
    pub workflow_agent_command: Option<String>,
}

impl PromptAdapter {
    /// `observer.step_started` is called from here, once the prompt text
    /// (or the `give-up` short-circuit) is known but before the LLM command
    /// is spawned — not after the whole invocation returns — so a daemon
    /// watching the status stream sees the step as in flight for the
    /// duration of the (potentially long) LLM call rather than learning
    /// about it and its result at the same instant.
    pub async fn run(&self, step: &Step, observer: &dyn StepObserver) -> Result<PromptOutcome, AdapterError> {
        let attempt_path = self.attempt_count_path(&step.name);
        let mut attempt = read_attempt_count(&attempt_path)
            .await
            .map_err(|source| AdapterError::Io { step: step.name.clone(), source })?;

        if let Some(max) = step.config_get("max_attempts").and_then(|s| s.parse::<u32>().ok()) {
            if attempt >= max {
                tracing::info!(step = %step.name, attempt, max, "max_attempts reached, giving up");
                observer.step_started(&step.name, None).await;
                return Ok(PromptOutcome {
                    result: GIVE_UP_RESULT.to_string(),
                    prompt_text: None,
                    agent_output: None,
                    attempt_number: attempt,
                });
            }
        }

        attempt += 1;
        write_attempt_count(&attempt_path, attempt)
            .await
            .map_err(|source| AdapterError::Io { step: step.name.clone(), source })?;

        let prompt_text = self.assemble_prompt(step).await?;
        observer.step_started(&step.name, Some(prompt_text.clone())).await;
        let mut cmd = self.build_command(step);

        tracing::debug!(step = %step.name, attempt, "invoking prompt adapter");

        cmd.current_dir(&self.workdir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = cmd.spawn().map_err(|source| AdapterError::Spawn {
            step: step.name.clone(),
            source,
        })?;

        let mut stdin = child.stdin.take().expect("piped stdin");
        stdin
            .write_all(prompt_text.as_bytes())
            .await
            .map_err(|source| AdapterError::Io { step: step.name.clone(), source })?;
        drop(stdin);

        let mut stdout = child.stdout.take().expect("piped stdout");
        let mut stderr = child.stderr.take().expect("piped stderr");
        let mut stdout_buf = Vec::new();
        let mut stderr_buf = Vec::new();
        let (stdout_result, stderr_result, status) = tokio::join!(
            stdout.read_to_end(&mut stdout_buf),
            stderr.read_to_end(&mut stderr_buf),
            child.wait(),
        );
        stdout_result.map_err(|source| AdapterError::Io { step: step.name.clone(), source })?;
        stderr_result.map_err(|source| AdapterError::Io { step: step.name.clone(), source })?;
        let status = status.map_err(|source| AdapterError::Io { step: step.name.clone(), source })?;

        let agent_output = String::from_utf8_lossy(&stdout_buf).to_string();
        let marker = extract_marker(&agent_output).map(str::to_string);
        let result = match marker {
            Some(name) => name,
            None if status.success() => "success".to_string(),
            None => "fail".to_string(),
        };

        Ok(PromptOutcome {
            result,
            prompt_text: Some(prompt_text),
            agent_output: Some(agent_output),
            attempt_number: attempt,
        })
    }

    fn attempt_count_path(&self, step_name: &str) -> PathBuf {
        self.workdir.join(".cloche").join("attempt_count").join(step_name)
    }

    /// Command precedence, most specific wins (DESIGN.md, resolving spec
    /// §4.5's otherwise-unordered "overridable per-step and per-workflow"):
    /// step config > workflow config > `AGENT_COMMAND` env > built-in default.
    ///
    /// An override is run through `sh -c` as a single string (same as the
    /// script adapter) rather than split on whitespace, so a quoted override
    /// like `claude -p --append-system-prompt "be terse"` is parsed with
    /// normal shell quoting instead of being torn apart word-by-word. The
    /// built-in default has no such quoting needs and is spawned directly.
    fn build_command(&self, step: &Step) -> Command {
        let raw = step
            .config_get("agent_command")
            .map(str::to_string)
            .or_else(|| self.workflow_agent_command.clone())
            .or_else(|| self.env_agent_command.clone());

        match raw {
            Some(command) => {
                let mut cmd = Command::new("sh");
                cmd.arg("-c").arg(command);
                cmd
            }
            None => {
                let (program, args) = DEFAULT_AGENT_COMMAND
                    .split_first()
                    .expect("DEFAULT_AGENT_COMMAND is never empty");
                let mut cmd = Command::new(program);
                cmd.args(args);
                cmd
            }
        }
    }

    /// Prompt assembly (spec §4.5, steps 1-4), joined with blank-line
    /// separators.
    async fn assemble_prompt(&self, step: &Step) -> Result<String, AdapterError> {
        let mut sections = Vec::new();

        sections.push(self.base_prompt(step).await?);

        if let Some(run_id) = &self.run_id {
            let user_prompt_path = self.workdir.join(".cloche").join(run_id.as_str()).join("prompt.txt");
            if let Ok(content) = tokio::fs::read_to_string(&user_prompt_path).await {
                if !content.trim().is_empty() {
                    sections.push(format!("## User Request\n\n{}", content.trim_end()));
                }
            }
        }

        if let Some(validation) = self.validation_output_section().await? {
            sections.push(validation);
        }

        sections.push(self.result_selection_section(step));

        Ok(sections.join("\n\n"))
    }

    async fn base_prompt(&self, step: &Step) -> Result<String, AdapterError> {
        let raw = step
            .config_get("prompt")
            .ok_or_else(|| AdapterError::MissingPrompt { step: step.name.clone() })?;

        if let Some(path) = file_literal_path(raw) {
            let full_path = self.workdir.join(path);
            tokio::fs::read_to_string(&full_path)
                .await
                .map_err(|source| AdapterError::PromptFile {
                    step: step.name.clone(),
                    path: path.to_string(),
                    source,
                })
        } else {
            Ok(raw.to_string())
        }
    }

    async fn validation_output_section(&self) -> Result<Option<String>, AdapterError> {
        let output_dir = self.workdir.join(".cloche").join("output");
        let mut entries = match tokio::fs::read_dir(&output_dir).await {
            Ok(entries) => entries,
            Err(_) => return Ok(None),
        };

        let mut logs = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|source| AdapterError::Io { step: "<validation-output>".to_string(), source })?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("log") {
                continue;
            }
            let step_name = path.file_stem().and_then(|s| s.to_str()).unwrap_or("unknown").to_string();
            let contents = tokio::fs::read_to_string(&path).await.unwrap_or_default();
            logs.push((step_name, contents));
        }
        if logs.is_empty() {
            return Ok(None);
        }
        logs.sort_by(|a, b| a.0.cmp(&b.0));

        let mut section = String::from("## Validation Output\n");
        for (step_name, contents) in logs {
            section.push_str(&format!("\n### {step_name}\n```\n{}\n```\n", contents.trim_end()));
        }
        Ok(Some(section.trim_end().to_string()))
    }

    fn result_selection_section(&self, step: &Step) -> String {
        let mut section = String::from("## Result Selection\n\n");
        section.push_str("When you are finished, output exactly one of the following on its own line:\n");
        for result in &step.results {
            section.push_str(&format!("CLOCHE_RESULT:{result}\n"));
        }
        section.trim_end().to_string()
    }
}

/// Recognizes the `file("path")` value form the parser preserves verbatim
/// and returns the path, if present.
fn file_literal_path(raw: &str) -> Option<&str> {
    raw.strip_prefix("file(\"")?.strip_suffix("\")")
}

async fn read_attempt_count(path: &Path) -> std::io::Result<u32> {
    match tokio::fs::read_to_string(path).await {
        Ok(contents) => Ok(contents.trim().parse().unwrap_or(0)),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(0),
        Err(err) => Err(err),
    }
}

async fn write_attempt_count(path: &Path, value: u32) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let mut file = tokio::fs::File::create(path).await?;
    file.write_all(value.to_string().as_bytes()).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use cloche_common::workflow::StepKind;
    use std::collections::HashMap;

    fn agent_step(name: &str, prompt: &str, results: &[&str], max_attempts: Option<u32>) -> Step {
        let mut config = HashMap::new();
        config.insert("prompt".to_string(), prompt.to_string());
        if let Some(max) = max_attempts {
            config.insert("max_attempts".to_string(), max.to_string());
        }
        Step {
            name: name.to_string(),
            kind: StepKind::Agent,
            results: results.iter().map(|s| s.to_string()).collect(),
            config,
        }
    }

    fn adapter(workdir: &Path) -> PromptAdapter {
        PromptAdapter {
            workdir: workdir.to_path_buf(),
            run_id: None,
            env_agent_command: None,
            workflow_agent_command: Some("echo CLOCHE_RESULT:success".to_string()),
        }
    }

    #[test]
    fn extracts_file_literal_path() {
        assert_eq!(file_literal_path("file(\"prompts/plan.txt\")"), Some("prompts/plan.txt"));
        assert_eq!(file_literal_path("plain text"), None);
    }

    #[tokio::test]
    async fn max_attempts_gives_up_without_invoking_the_command() {
        let dir = tempfile::tempdir().unwrap();
        let step = agent_step("code", "do it", &["success", "fail", "give-up"], Some(2));
        let attempt_path = dir.path().join(".cloche/attempt_count/code");
        write_attempt_count(&attempt_path, 2).await.unwrap();

        let adapter = adapter(dir.path());
        let outcome = adapter.run(&step, &cloche_common::NullObserver).await.unwrap();
        assert_eq!(outcome.result, GIVE_UP_RESULT);
        assert!(outcome.prompt_text.is_none());
    }

    #[tokio::test]
    async fn quoted_command_override_is_parsed_with_shell_quoting() {
        let dir = tempfile::tempdir().unwrap();
        let step = agent_step("code", "do it", &["success", "fail"], None);
        let mut adapter = adapter(dir.path());
        adapter.workflow_agent_command =
            Some(r#"sh -c 'echo "CLOCHE_RESULT:success"'"#.to_string());

        let outcome = adapter.run(&step, &cloche_common::NullObserver).await.unwrap();
        assert_eq!(outcome.result, "success");
    }

    #[tokio::test]
    async fn attempt_counter_increments_on_each_invocation() {
        let dir = tempfile::tempdir().unwrap();
        let step = agent_step("code", "do it", &["success", "fail"], Some(5));
        let adapter = adapter(dir.path());

        let outcome = adapter.run(&step, &cloche_common::NullObserver).await.unwrap();
        assert_eq!(outcome.attempt_number, 1);
        assert_eq!(outcome.result, "success");

        let outcome = adapter.run(&step, &cloche_common::NullObserver).await.unwrap();
        assert_eq!(outcome.attempt_number, 2);
    }

    #[tokio::test]
    async fn result_selection_section_lists_every_declared_result() {
        let dir = tempfile::tempdir().unwrap();
        let step = agent_step("code", "do it", &["success", "fail"], None);
        let adapter = adapter(dir.path());
        let prompt = adapter.assemble_prompt(&step).await.unwrap();
        assert!(prompt.contains("CLOCHE_RESULT:success"));
        assert!(prompt.contains("CLOCHE_RESULT:fail"));
    }

    #[tokio::test]
    async fn file_prompt_is_read_from_workdir() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("plan.txt"), "make a plan").await.unwrap();
        let step = agent_step("plan", "file(\"plan.txt\")", &["success"], None);
        let adapter = adapter(dir.path());
        let prompt = adapter.assemble_prompt(&step).await.unwrap();
        assert!(prompt.contains("make a plan"));
    }
}
