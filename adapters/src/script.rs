//! The script adapter (spec §4.4): runs a step's `run` command through a
//! POSIX shell, captures combined stdout+stderr to
//! `<workdir>/.cloche/output/<step_name>.log`, and infers a result from the
//! result marker or the process exit code.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use cloche_common::workflow::Step;
use cloche_common::{extract_marker, marker::strip_markers};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;

use crate::error::AdapterError;

/// What running one script step produced.
pub struct ScriptOutcome {
    pub result: String,
    /// The marker-stripped combined stdout+stderr, as persisted to the log
    /// file.
    pub logs: String,
}

pub struct ScriptAdapter {
    pub workdir: PathBuf,
}

impl ScriptAdapter {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self { workdir: workdir.into() }
    }

    fn output_log_path(&self, step_name: &str) -> PathBuf {
        self.workdir.join(".cloche").join("output").join(format!("{step_name}.log"))
    }

    pub async fn run(&self, step: &Step) -> Result<ScriptOutcome, AdapterError> {
        let command = step
            .config_get("run")
            .ok_or_else(|| AdapterError::MissingRunCommand { step: step.name.clone() })?
            .to_string();

        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(&command)
            .current_dir(&self.workdir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        for (key, value) in step_env(step) {
            let expanded = shellexpand::env(&value).unwrap_or_else(|_| value.clone().into());
            cmd.env(key, expanded.as_ref());
        }

        tracing::debug!(step = %step.name, command = %command, "running script step");

        let mut child = cmd.spawn().map_err(|source| AdapterError::Spawn {
            step: step.name.clone(),
            source,
        })?;

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

        let combined = format!(
            "{}{}",
            String::from_utf8_lossy(&stdout_buf),
            String::from_utf8_lossy(&stderr_buf)
        );

        let marker = extract_marker(&combined).map(str::to_string);
        let result = match marker {
            Some(name) => name,
            None if status.success() => default_result(step, "success"),
            None => default_result(step, "fail"),
        };

        let cleaned = strip_markers(&combined);
        persist_log(&self.output_log_path(&step.name), &cleaned)
            .await
            .map_err(|source| AdapterError::Io { step: step.name.clone(), source })?;

        Ok(ScriptOutcome { result, logs: cleaned })
    }
}

/// The marker-less fallback result (spec §4.4): the named default if the
/// step declares it, otherwise the first declared result.
fn default_result(step: &Step, preferred: &str) -> String {
    if step.declares_result(preferred) {
        preferred.to_string()
    } else {
        step.results.first().cloned().unwrap_or_else(|| preferred.to_string())
    }
}

fn step_env(step: &Step) -> Vec<(String, String)> {
    const PREFIX: &str = "env.";
    step.config
        .iter()
        .filter_map(|(key, value)| {
            key.strip_prefix(PREFIX).map(|name| (name.to_string(), value.clone()))
        })
        .collect()
}

async fn persist_log(path: &Path, contents: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let mut file = tokio::fs::File::create(path).await?;
    file.write_all(contents.as_bytes()).await
}
