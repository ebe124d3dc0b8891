//! Result publication (spec §4.3): after a run completes, push the
//! workspace contents to the host as a branch named `cloche/<run_id>`.
//! Grounded in the teacher's `git-mcp` handlers (`mcps/git-mcp/src/handlers/core.rs`),
//! which use `git2` for the same tree/commit/push plumbing against a local
//! working tree. Failures here are logged and never change the run's
//! terminal state (spec §4.3: "Failures are logged but do not change the
//! run's terminal state").

use std::path::Path;

use cloche_common::RunId;
use git2::{IndexAddOption, Repository, Signature};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PublishError {
    #[error(transparent)]
    Git(#[from] git2::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Publishes the workdir's current contents to `remote_url` as
/// `cloche/<run_id>`. Runs the synchronous `git2` plumbing on a blocking
/// task since `Repository` is not `Send`-friendly across `.await` points.
pub async fn publish_result(workdir: &Path, run_id: &RunId, remote_url: &str) {
    let workdir = workdir.to_path_buf();
    let run_id_owned = run_id.clone();
    let remote_url = remote_url.to_string();
    let log_run_id = run_id.clone();

    let outcome = tokio::task::spawn_blocking(move || publish_blocking(&workdir, &run_id_owned, &remote_url)).await;

    match outcome {
        Ok(Ok(())) => tracing::info!(run_id = %log_run_id, "published run result"),
        Ok(Err(err)) => tracing::warn!(run_id = %log_run_id, error = %err, "result publication failed"),
        Err(err) => tracing::warn!(run_id = %log_run_id, error = %err, "result publication task panicked"),
    }
}

fn publish_blocking(workdir: &Path, run_id: &RunId, remote_url: &str) -> Result<(), PublishError> {
    let branch_name = format!("cloche/{run_id}");
    let repo = Repository::init(workdir)?;

    let mut index = repo.index()?;
    index.add_all(["*"].iter(), IndexAddOption::DEFAULT, None)?;
    index.write()?;
    let tree_oid = index.write_tree()?;
    let tree = repo.find_tree(tree_oid)?;

    let mut remote = match repo.find_remote("origin") {
        Ok(remote) => remote,
        Err(_) => repo.remote("origin", remote_url)?,
    };
    remote.fetch(&["HEAD"], None, None)?;
    let parent = repo.find_reference("FETCH_HEAD")?.peel_to_commit()?;

    let diff = repo.diff_tree_to_tree(Some(&parent.tree()?), Some(&tree), None)?;
    let stats = diff.stats()?;
    let message = commit_message(workdir, run_id, stats.files_changed(), stats.insertions(), stats.deletions());

    let sig = Signature::now("cloche-runner", "cloche-runner@localhost")?;
    let commit_oid = repo.commit(None, &sig, &sig, &message, &tree, &[&parent])?;

    let refspec = format!("{commit_oid}:refs/heads/{branch_name}");
    remote.push(&[refspec.as_str()], None)?;

    Ok(())
}

/// Static-template commit message (spec §4.3 allows an LLM-authored
/// message when a user prompt is available; this implementation always
/// uses the template, folding in the prompt's first line when present,
/// rather than spending an extra LLM invocation on message wording — noted
/// as a scope decision in the design ledger).
fn commit_message(workdir: &Path, run_id: &RunId, files_changed: usize, insertions: usize, deletions: usize) -> String {
    let prompt_path = workdir.join(".cloche").join(run_id.as_str()).join("prompt.txt");
    let summary = std::fs::read_to_string(prompt_path)
        .ok()
        .and_then(|content| content.lines().find(|l| !l.trim().is_empty()).map(str::to_string))
        .unwrap_or_else(|| format!("cloche run {run_id} result"));

    format!("{summary}\n\n{files_changed} file(s) changed, +{insertions}/-{deletions}")
}
