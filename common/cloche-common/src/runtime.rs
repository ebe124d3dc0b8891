//! The `Runtime` abstraction (spec §4.6/§6.4): how a run's runner process is
//! actually launched. Generalizes `ManagedServer::start`/`stop` in the
//! teacher's `agent/src/mcps/daemon.rs`, which spawns and supervises a child
//! process by name and waits on its lifecycle.
//!
//! Exactly one concrete implementation ships in this workspace
//! (`cloche-runtime-local`, a local subprocess runtime). Container and other
//! remote runtimes are described by this trait only; selecting one at
//! runtime that nothing implements yet is a `RuntimeError::UnsupportedKind`.

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use thiserror::Error;

use crate::id::{InstanceId, RunId};

/// Everything a `Runtime` needs to start a runner instance for one run.
#[derive(Debug, Clone)]
pub struct RuntimeStartConfig {
    pub run_id: RunId,
    pub workflow_path: PathBuf,
    pub project_dir: PathBuf,
    pub env: HashMap<String, String>,
}

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("runtime kind '{0}' is not implemented")]
    UnsupportedKind(String),
    #[error("failed to start instance: {0}")]
    StartFailed(String),
    #[error("instance {0} not found")]
    InstanceNotFound(InstanceId),
    #[error("failed to stop instance {0}: {1}")]
    StopFailed(InstanceId, String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A place where a runner process can execute: a local subprocess, or (not
/// implemented here) a container or remote sandbox.
#[async_trait]
pub trait Runtime: Send + Sync {
    /// Launch a runner instance, returning its status-stream source. The
    /// caller drives it by reading lines until the stream closes.
    async fn start(
        &self,
        config: RuntimeStartConfig,
    ) -> Result<(InstanceId, Box<dyn StatusSource>), RuntimeError>;

    /// Forcibly stop a running instance, e.g. in response to `StopRun`.
    async fn stop(&self, instance: &InstanceId) -> Result<(), RuntimeError>;
}

/// A line-oriented source of status-stream output from a runner instance.
#[async_trait]
pub trait StatusSource: Send {
    /// Read the next status-stream line, or `None` once the stream closes.
    async fn next_line(&mut self) -> Result<Option<String>, RuntimeError>;

    /// Wait for the instance to exit and return its exit code. Only
    /// meaningful after `next_line` has returned `None`; used by the daemon's
    /// ingestion task to determine the terminal run state when the status
    /// stream ended without an explicit `run_completed` message (spec §4.6:
    /// "the task waits for the runtime to exit; if the run is still
    /// running, the exit code determines the terminal state").
    async fn wait_exit(&mut self) -> Result<i32, RuntimeError>;
}
