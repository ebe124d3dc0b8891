//! The RPC server (spec §4.6 supplemental): a Unix domain socket speaking
//! one-JSON-object-per-line request/response, generalizing the teacher's
//! `McpDaemon::run`/`handle_connection` (`agent/src/mcps/daemon.rs`) from MCP
//! server supervision to workflow-run supervision. `StreamLogs` is the one
//! request that writes more than one response line before closing the
//! connection.

use std::path::Path;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};

use crate::error::RpcError;
use crate::protocol::{DaemonRequest, DaemonResponse};
use crate::supervisor::DaemonState;

pub struct DaemonServer {
    state: Arc<DaemonState>,
}

impl DaemonServer {
    pub fn new(state: Arc<DaemonState>) -> Self {
        Self { state }
    }

    /// Binds `listen_addr` and serves connections until an accept error or
    /// the process is killed. Each connection is handled on its own task so
    /// one slow `StreamLogs` client never blocks another request.
    pub async fn run(self, listen_addr: &Path) -> Result<(), RpcError> {
        if let Some(parent) = listen_addr.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let _ = tokio::fs::remove_file(listen_addr).await;

        let listener = UnixListener::bind(listen_addr)?;
        tracing::info!(path = %listen_addr.display(), "cloche daemon listening");

        loop {
            let (stream, _) = listener.accept().await?;
            let state = Arc::clone(&self.state);
            tokio::spawn(async move {
                if let Err(err) = handle_connection(state, stream).await {
                    tracing::warn!(error = %err, "connection error");
                }
            });
        }
    }
}

async fn handle_connection(state: Arc<DaemonState>, stream: UnixStream) -> Result<(), RpcError> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();
    reader.read_line(&mut line).await?;

    if line.trim().is_empty() {
        return Ok(());
    }

    let request: DaemonRequest = match serde_json::from_str(line.trim()) {
        Ok(request) => request,
        Err(err) => {
            return write_line(&mut writer, &DaemonResponse::error(format!("malformed request: {err}"))).await;
        }
    };

    dispatch(&state, request, &mut writer).await
}

async fn write_line(writer: &mut (impl AsyncWrite + Unpin), response: &DaemonResponse) -> Result<(), RpcError> {
    let json = serde_json::to_string(response).map_err(|err| RpcError::MalformedRequest(err.to_string()))?;
    writer.write_all(json.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await?;
    Ok(())
}

async fn dispatch(
    state: &Arc<DaemonState>,
    request: DaemonRequest,
    writer: &mut (impl AsyncWrite + Unpin),
) -> Result<(), RpcError> {
    match request {
        DaemonRequest::RunWorkflow { project_dir, workflow_name, prompt } => {
            let response = match state.run_workflow(project_dir, workflow_name, prompt).await {
                Ok(run_id) => DaemonResponse::RunStarted { run_id },
                Err(err) => DaemonResponse::error(err.to_string()),
            };
            write_line(writer, &response).await
        }
        DaemonRequest::ListRuns => {
            let response = match state.store.list_runs().await {
                Ok(runs) => DaemonResponse::Runs { runs },
                Err(err) => DaemonResponse::error(err.to_string()),
            };
            write_line(writer, &response).await
        }
        DaemonRequest::GetStatus { run_id } => {
            let response = match state.get_status(&run_id).await {
                Ok((run, steps)) => DaemonResponse::Status { run, steps },
                Err(err) => DaemonResponse::error(err.to_string()),
            };
            write_line(writer, &response).await
        }
        DaemonRequest::StreamLogs { run_id } => stream_logs(state, &run_id, writer).await,
        DaemonRequest::StopRun { run_id } => {
            let response = match state.stop_run(&run_id).await {
                Ok(()) => DaemonResponse::Ok,
                Err(err) => DaemonResponse::error(err.to_string()),
            };
            write_line(writer, &response).await
        }
    }
}

async fn stream_logs(
    state: &Arc<DaemonState>,
    run_id: &cloche_common::RunId,
    writer: &mut (impl AsyncWrite + Unpin),
) -> Result<(), RpcError> {
    let run = match state.store.get_run(run_id).await {
        Ok(run) => run,
        Err(err) => return write_line(writer, &DaemonResponse::error(err.to_string())).await,
    };

    let captures = state.store.list_captures(run_id).await.unwrap_or_default();
    for capture in captures {
        write_line(writer, &DaemonResponse::LogEntry { capture }).await?;
    }

    if run.state.is_terminal() {
        write_line(writer, &DaemonResponse::RunCompleted { state: run.state }).await?;
    }
    Ok(())
}
