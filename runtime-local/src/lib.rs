//! Local-subprocess [`Runtime`] (spec §4.6): the one concrete `Runtime` this
//! workspace ships. Generalizes the teacher's `ManagedServer::start`/`stop`
//! (`agent/src/mcps/daemon.rs`) from supervising an MCP server process to
//! supervising a runner process for one workflow run. Container or remote
//! runtimes are described only by the `Runtime` trait; selecting
//! `RUNTIME_KIND` other than `local` has no built-in implementation here.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use cloche_common::{InstanceId, Runtime, RuntimeError, RuntimeStartConfig, StatusSource};
use tokio::io::{AsyncBufReadExt, BufReader, Lines};
use tokio::process::{Child, ChildStdout, Command};
use tokio::sync::Mutex;

type Children = Arc<Mutex<HashMap<InstanceId, Child>>>;

/// Spawns the runner binary directly with `tokio::process::Command`, one
/// child process per run. Live children are kept in a shared map so `stop`
/// can signal a run whose status source is owned by a different task (the
/// daemon's ingestion task).
pub struct LocalRuntime {
    runner_path: PathBuf,
    children: Children,
}

impl LocalRuntime {
    pub fn new(runner_path: impl Into<PathBuf>) -> Self {
        Self {
            runner_path: runner_path.into(),
            children: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

#[async_trait]
impl Runtime for LocalRuntime {
    async fn start(
        &self,
        config: RuntimeStartConfig,
    ) -> Result<(InstanceId, Box<dyn StatusSource>), RuntimeError> {
        let mut cmd = Command::new(&self.runner_path);
        cmd.arg(&config.workflow_path)
            .arg(&config.project_dir)
            .current_dir(&config.project_dir)
            .env("RUN_ID", config.run_id.as_str())
            .envs(&config.env)
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .stdin(Stdio::null());

        let mut child = cmd
            .spawn()
            .map_err(|err| RuntimeError::StartFailed(err.to_string()))?;

        let pid = child
            .id()
            .ok_or_else(|| RuntimeError::StartFailed("runner child has no pid".to_string()))?;
        let instance = InstanceId::new(format!("local-{pid}"));

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| RuntimeError::StartFailed("runner child has no stdout".to_string()))?;
        let lines = BufReader::new(stdout).lines();

        self.children.lock().await.insert(instance.clone(), child);

        tracing::info!(run_id = %config.run_id, instance = %instance, "started local runner instance");

        let source: Box<dyn StatusSource> = Box::new(ChildStatusSource {
            lines,
            instance: instance.clone(),
            children: Arc::clone(&self.children),
        });
        Ok((instance, source))
    }

    async fn stop(&self, instance: &InstanceId) -> Result<(), RuntimeError> {
        let mut children = self.children.lock().await;
        let child = children
            .get_mut(instance)
            .ok_or_else(|| RuntimeError::InstanceNotFound(instance.clone()))?;
        child
            .start_kill()
            .map_err(|err| RuntimeError::StopFailed(instance.clone(), err.to_string()))?;
        tracing::info!(instance = %instance, "sent kill to local runner instance");
        Ok(())
    }
}

struct ChildStatusSource {
    lines: Lines<BufReader<ChildStdout>>,
    instance: InstanceId,
    children: Children,
}

#[async_trait]
impl StatusSource for ChildStatusSource {
    async fn next_line(&mut self) -> Result<Option<String>, RuntimeError> {
        self.lines.next_line().await.map_err(RuntimeError::Io)
    }

    async fn wait_exit(&mut self) -> Result<i32, RuntimeError> {
        let mut children = self.children.lock().await;
        let Some(mut child) = children.remove(&self.instance) else {
            return Ok(0);
        };
        drop(children);
        let status = child.wait().await.map_err(RuntimeError::Io)?;
        Ok(status.code().unwrap_or(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cloche_common::RunId;
    use std::collections::HashMap as StdHashMap;

    fn echo_script(dir: &std::path::Path, contents: &str) -> PathBuf {
        let path = dir.join("fake-runner.sh");
        std::fs::write(&path, contents).unwrap();
        let mut perms = std::fs::metadata(&path).unwrap().permissions();
        use std::os::unix::fs::PermissionsExt;
        perms.set_mode(0o755);
        std::fs::set_permissions(&path, perms).unwrap();
        path
    }

    #[tokio::test]
    async fn start_reads_status_lines_from_stdout() {
        let dir = tempfile::tempdir().unwrap();
        let script = echo_script(
            &dir.path(),
            "#!/bin/sh\necho '{\"type\":\"run_completed\",\"result\":\"succeeded\"}'\n",
        );
        let runtime = LocalRuntime::new(script);
        let config = RuntimeStartConfig {
            run_id: RunId::new("run-1"),
            workflow_path: dir.path().join("wf.cloche"),
            project_dir: dir.path().to_path_buf(),
            env: StdHashMap::new(),
        };

        let (_instance, mut source) = runtime.start(config).await.unwrap();
        let line = source.next_line().await.unwrap().unwrap();
        assert!(line.contains("run_completed"));
        assert!(source.next_line().await.unwrap().is_none());
        assert_eq!(source.wait_exit().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn stop_on_unknown_instance_fails() {
        let dir = tempfile::tempdir().unwrap();
        let script = echo_script(&dir.path(), "#!/bin/sh\nexit 0\n");
        let runtime = LocalRuntime::new(script);
        let err = runtime.stop(&InstanceId::new("local-999999")).await.unwrap_err();
        assert!(matches!(err, RuntimeError::InstanceNotFound(_)));
    }
}
