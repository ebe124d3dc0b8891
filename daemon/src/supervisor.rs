//! Run allocation and supervision (spec §4.6): the daemon half of
//! `RunWorkflow` and `StopRun` — allocating a run id, persisting the user
//! prompt, starting a runner instance through the configured `Runtime`, and
//! tracking the live instance map `StopRun` consults.
//!
//! Ingestion of the started instance's status stream is handled by
//! [`crate::ingestion`]; this module only owns the instance map and the
//! synchronous half of run setup.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use cloche_common::{InstanceId, PersistenceStore, Run, RunId, RunState, Runtime, RuntimeStartConfig, StepExecution};
use tokio::sync::Mutex;

use crate::config::DaemonConfig;
use crate::error::RpcError;
use crate::ingestion;

/// Shared daemon state: persistence, the configured runtime (if any), and
/// the live run-id → instance-id map `StopRun` and the ingestion tasks
/// consult.
pub struct DaemonState {
    pub config: DaemonConfig,
    pub store: Arc<dyn PersistenceStore>,
    pub runtime: Option<Arc<dyn Runtime>>,
    instances: Mutex<HashMap<RunId, InstanceId>>,
}

impl DaemonState {
    pub fn new(config: DaemonConfig, store: Arc<dyn PersistenceStore>, runtime: Option<Arc<dyn Runtime>>) -> Arc<Self> {
        Arc::new(Self {
            config,
            store,
            runtime,
            instances: Mutex::new(HashMap::new()),
        })
    }

    /// Mark every non-terminal run as `Failed` (spec §4.6 "Startup sweep"):
    /// no run can legitimately still be in flight across a process restart.
    pub async fn startup_sweep(&self) -> Result<(), RpcError> {
        self.store.fail_all_incomplete_runs("daemon restarted").await?;
        Ok(())
    }

    /// Allocates a run id, persists the prompt, creates the `pending` run
    /// record, starts a runner instance, transitions to `running`, and
    /// spawns the ingestion task. Returns the new run id.
    pub async fn run_workflow(
        self: &Arc<Self>,
        project_dir: PathBuf,
        workflow_name: String,
        prompt: Option<String>,
    ) -> Result<RunId, RpcError> {
        let Some(runtime) = self.runtime.clone() else {
            return Err(RpcError::NoRuntime(self.config.runtime_kind.clone()));
        };

        let run_id = if self.config.friendly_run_ids {
            RunId::generate_friendly()
        } else {
            RunId::generate()
        };

        if let Some(prompt) = &prompt {
            let prompt_path = project_dir.join(".cloche").join(run_id.as_str()).join("prompt.txt");
            if let Some(parent) = prompt_path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(&prompt_path, prompt).await?;
        }

        let run = Run::pending(run_id.clone(), workflow_name.clone(), project_dir.clone());
        self.store.create_run(&run).await?;

        let workflow_path = project_dir.join(format!("{workflow_name}.cloche"));
        let start_config = RuntimeStartConfig {
            run_id: run_id.clone(),
            workflow_path,
            project_dir: project_dir.clone(),
            env: HashMap::new(),
        };

        let (instance_id, source) = match runtime.start(start_config).await {
            Ok(started) => started,
            Err(err) => {
                self.store
                    .update_run_state(&run_id, RunState::Failed, Some(&err.to_string()))
                    .await?;
                return Err(err.into());
            }
        };

        self.store.update_run_state(&run_id, RunState::Running, None).await?;
        self.instances.lock().await.insert(run_id.clone(), instance_id.clone());
        tracing::info!(run_id = %run_id, workflow = %workflow_name, "started run");

        let state = Arc::clone(self);
        let ingest_run_id = run_id.clone();
        tokio::spawn(async move {
            ingestion::run(state, ingest_run_id, instance_id, project_dir, workflow_name, source).await;
        });

        Ok(run_id)
    }

    /// `GetStatus` (spec §4.6): the run header plus its merged step
    /// executions.
    pub async fn get_status(&self, run_id: &RunId) -> Result<(Run, Vec<StepExecution>), RpcError> {
        let run = self.store.get_run(run_id).await?;
        let captures = self.store.list_captures(run_id).await?;
        Ok((run, cloche_common::merge_captures(&captures)))
    }

    /// `StopRun` (spec §4.6): stop the run's runtime instance and mark it
    /// `cancelled`; fails if the run is not currently in flight.
    pub async fn stop_run(&self, run_id: &RunId) -> Result<(), RpcError> {
        let Some(runtime) = &self.runtime else {
            return Err(RpcError::NoRuntime(self.config.runtime_kind.clone()));
        };
        let instance = self.instances.lock().await.get(run_id).cloned();
        let Some(instance) = instance else {
            return Err(RpcError::RunNotInFlight(run_id.clone()));
        };
        runtime.stop(&instance).await?;
        self.store
            .update_run_state(run_id, RunState::Cancelled, Some("stopped by client"))
            .await?;
        tracing::info!(run_id = %run_id, "stopped run");
        Ok(())
    }

    /// Called by the ingestion task once a run's instance has exited, so
    /// `StopRun` stops reporting it as in flight.
    pub(crate) async fn forget_instance(&self, run_id: &RunId) {
        self.instances.lock().await.remove(run_id);
    }
}
