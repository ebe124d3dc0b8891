//! `.cloche/history.log` (spec §6.5, SPEC_FULL.md supplemental): one
//! append-only line per terminal run, written by the daemon immediately
//! after a run reaches a terminal state.

use std::path::Path;

use chrono::Utc;
use cloche_common::{RunId, RunState};
use tokio::io::AsyncWriteExt;

/// `<rfc3339> <run_id> <workflow_name> <final_state>`.
pub async fn append(
    project_dir: &Path,
    run_id: &RunId,
    workflow_name: &str,
    state: RunState,
) -> std::io::Result<()> {
    let path = project_dir.join(".cloche").join("history.log");
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let line = format!("{} {run_id} {workflow_name} {state}\n", Utc::now().to_rfc3339());
    let mut file = tokio::fs::OpenOptions::new().create(true).append(true).open(&path).await?;
    file.write_all(line.as_bytes()).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn appends_one_line_per_call() {
        let dir = tempfile::tempdir().unwrap();
        append(dir.path(), &RunId::new("run-1"), "demo", RunState::Succeeded).await.unwrap();
        append(dir.path(), &RunId::new("run-2"), "demo", RunState::Failed).await.unwrap();

        let contents = tokio::fs::read_to_string(dir.path().join(".cloche").join("history.log"))
            .await
            .unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("run-1") && lines[0].contains("succeeded"));
        assert!(lines[1].contains("run-2") && lines[1].contains("failed"));
    }
}
