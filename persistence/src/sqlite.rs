//! `rusqlite`-backed [`PersistenceStore`]. Generalizes the teacher's
//! `Database` (`agent/src/db/mod.rs`): one `Connection` behind a blocking
//! `Mutex`, opened once, schema created on open. Because `PersistenceStore`'s
//! methods are `async` (the daemon calls them from async RPC handlers) while
//! `rusqlite` is synchronous, each call runs the blocking connection work
//! inside `tokio::task::spawn_blocking`.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use cloche_common::persistence::{PersistenceStore, StoreError};
use cloche_common::run::{Capture, CapturePhase, Run, RunState};
use cloche_common::RunId;
use rusqlite::{params, Connection, OptionalExtension};

use crate::schema;

#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path).map_err(db_err)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;").map_err(db_err)?;
        schema::create_tables(&conn).map_err(db_err)?;
        tracing::info!(path = %path.display(), "opened run database");
        Ok(Self { conn: Arc::new(Mutex::new(conn)) })
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        schema::create_tables(&conn).map_err(db_err)?;
        Ok(Self { conn: Arc::new(Mutex::new(conn)) })
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Connection) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn.lock().unwrap();
            f(&guard)
        })
        .await
        .map_err(|e| StoreError::Database(format!("blocking task panicked: {e}")))?
    }
}

fn db_err(err: rusqlite::Error) -> StoreError {
    StoreError::Database(err.to_string())
}

fn rfc3339(at: DateTime<Utc>) -> String {
    at.to_rfc3339()
}

fn parse_rfc3339(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn row_to_run(row: &rusqlite::Row) -> rusqlite::Result<Run> {
    let id: String = row.get(0)?;
    let workflow_name: String = row.get(1)?;
    let project_dir: String = row.get(2)?;
    let state: String = row.get(3)?;
    let active_steps: String = row.get(4)?;
    let started_at: String = row.get(5)?;
    let completed_at: Option<String> = row.get(6)?;
    let error: Option<String> = row.get(7)?;

    Ok(Run {
        id: RunId::new(id),
        workflow_name,
        project_dir: PathBuf::from(project_dir),
        state: state.parse().unwrap_or(RunState::Failed),
        active_steps: serde_json::from_str(&active_steps).unwrap_or_default(),
        started_at: parse_rfc3339(&started_at),
        completed_at: completed_at.as_deref().map(parse_rfc3339),
        error,
    })
}

fn row_to_capture(row: &rusqlite::Row) -> rusqlite::Result<Capture> {
    let id: i64 = row.get(0)?;
    let run_id: String = row.get(1)?;
    let step_name: String = row.get(2)?;
    let phase: String = row.get(3)?;
    let prompt_text: Option<String> = row.get(4)?;
    let started_at: Option<String> = row.get(5)?;
    let completed_at: Option<String> = row.get(6)?;
    let result: Option<String> = row.get(7)?;
    let agent_output: Option<String> = row.get(8)?;
    let attempt_number: Option<i64> = row.get(9)?;
    let script_logs: Option<String> = row.get(10)?;

    Ok(Capture {
        id,
        run_id: RunId::new(run_id),
        step_name,
        phase: if phase == "started" { CapturePhase::Started } else { CapturePhase::Completed },
        prompt_text,
        started_at: started_at.as_deref().map(parse_rfc3339),
        completed_at: completed_at.as_deref().map(parse_rfc3339),
        result,
        agent_output,
        attempt_number: attempt_number.map(|n| n as u32),
        script_logs,
    })
}

#[async_trait]
impl PersistenceStore for SqliteStore {
    async fn create_run(&self, run: &Run) -> Result<(), StoreError> {
        let run = run.clone();
        self.with_conn(move |conn| {
            conn.execute(
                r#"INSERT INTO runs (id, workflow_name, project_dir, state, active_steps, started_at, completed_at, error)
                   VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"#,
                params![
                    run.id.as_str(),
                    run.workflow_name,
                    run.project_dir.to_string_lossy().to_string(),
                    run.state.to_string(),
                    serde_json::to_string(&run.active_steps).unwrap_or_default(),
                    rfc3339(run.started_at),
                    run.completed_at.map(rfc3339),
                    run.error,
                ],
            )
            .map_err(db_err)?;
            Ok(())
        })
        .await
    }

    async fn update_run_state(
        &self,
        run_id: &RunId,
        state: RunState,
        error: Option<&str>,
    ) -> Result<(), StoreError> {
        let run_id = run_id.clone();
        let error = error.map(str::to_string);
        let completed_at = state.is_terminal().then(|| rfc3339(Utc::now()));
        self.with_conn(move |conn| {
            let updated = conn
                .execute(
                    r#"UPDATE runs SET state = ?1, error = ?2, completed_at = COALESCE(?3, completed_at) WHERE id = ?4"#,
                    params![state.to_string(), error, completed_at, run_id.as_str()],
                )
                .map_err(db_err)?;
            if updated == 0 {
                return Err(StoreError::RunNotFound(run_id));
            }
            Ok(())
        })
        .await
    }

    async fn set_active_steps(&self, run_id: &RunId, active_steps: &[String]) -> Result<(), StoreError> {
        let run_id = run_id.clone();
        let active_steps = active_steps.to_vec();
        self.with_conn(move |conn| {
            let updated = conn
                .execute(
                    "UPDATE runs SET active_steps = ?1 WHERE id = ?2",
                    params![serde_json::to_string(&active_steps).unwrap_or_default(), run_id.as_str()],
                )
                .map_err(db_err)?;
            if updated == 0 {
                return Err(StoreError::RunNotFound(run_id));
            }
            Ok(())
        })
        .await
    }

    async fn append_capture(&self, capture: &Capture) -> Result<(), StoreError> {
        let capture = capture.clone();
        self.with_conn(move |conn| {
            conn.execute(
                r#"INSERT INTO captures
                   (run_id, step_name, phase, prompt_text, started_at, completed_at, result, agent_output, attempt_number, script_logs)
                   VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"#,
                params![
                    capture.run_id.as_str(),
                    capture.step_name,
                    match capture.phase { CapturePhase::Started => "started", CapturePhase::Completed => "completed" },
                    capture.prompt_text,
                    capture.started_at.map(rfc3339),
                    capture.completed_at.map(rfc3339),
                    capture.result,
                    capture.agent_output,
                    capture.attempt_number.map(|n| n as i64),
                    capture.script_logs,
                ],
            )
            .map_err(db_err)?;
            Ok(())
        })
        .await
    }

    async fn get_run(&self, run_id: &RunId) -> Result<Run, StoreError> {
        let run_id = run_id.clone();
        self.with_conn(move |conn| {
            conn.query_row(
                r#"SELECT id, workflow_name, project_dir, state, active_steps, started_at, completed_at, error
                   FROM runs WHERE id = ?1"#,
                params![run_id.as_str()],
                row_to_run,
            )
            .optional()
            .map_err(db_err)?
            .ok_or(StoreError::RunNotFound(run_id))
        })
        .await
    }

    async fn list_runs(&self) -> Result<Vec<Run>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    r#"SELECT id, workflow_name, project_dir, state, active_steps, started_at, completed_at, error
                       FROM runs ORDER BY started_at DESC"#,
                )
                .map_err(db_err)?;
            let rows = stmt
                .query_map([], row_to_run)
                .map_err(db_err)?
                .collect::<Result<Vec<_>, _>>()
                .map_err(db_err)?;
            Ok(rows)
        })
        .await
    }

    async fn list_captures(&self, run_id: &RunId) -> Result<Vec<Capture>, StoreError> {
        let run_id = run_id.clone();
        self.with_conn(move |conn| {
            let mut stmt = conn
                .prepare(
                    r#"SELECT id, run_id, step_name, phase, prompt_text, started_at, completed_at, result, agent_output, attempt_number, script_logs
                       FROM captures WHERE run_id = ?1 ORDER BY id ASC"#,
                )
                .map_err(db_err)?;
            let rows = stmt
                .query_map(params![run_id.as_str()], row_to_capture)
                .map_err(db_err)?
                .collect::<Result<Vec<_>, _>>()
                .map_err(db_err)?;
            Ok(rows)
        })
        .await
    }

    async fn fail_all_incomplete_runs(&self, reason: &str) -> Result<(), StoreError> {
        let reason = reason.to_string();
        self.with_conn(move |conn| {
            conn.execute(
                r#"UPDATE runs SET state = ?1, error = ?2, completed_at = ?3
                   WHERE state NOT IN ('succeeded', 'failed', 'cancelled')"#,
                params![RunState::Failed.to_string(), reason, rfc3339(Utc::now())],
            )
            .map_err(db_err)?;
            Ok(())
        })
        .await
    }

    async fn list_runs_since(
        &self,
        project_dir: &Path,
        workflow_name: &str,
        since_run_id: &RunId,
    ) -> Result<Vec<Run>, StoreError> {
        let project_dir = project_dir.to_string_lossy().to_string();
        let workflow_name = workflow_name.to_string();
        let since_run_id = since_run_id.clone();
        self.with_conn(move |conn| {
            let since_started_at: Option<String> = conn
                .query_row("SELECT started_at FROM runs WHERE id = ?1", params![since_run_id.as_str()], |row| row.get(0))
                .optional()
                .map_err(db_err)?;
            let Some(since_started_at) = since_started_at else {
                return Err(StoreError::RunNotFound(since_run_id));
            };

            let mut stmt = conn
                .prepare(
                    r#"SELECT id, workflow_name, project_dir, state, active_steps, started_at, completed_at, error
                       FROM runs
                       WHERE project_dir = ?1 AND workflow_name = ?2 AND started_at > ?3
                       ORDER BY started_at ASC"#,
                )
                .map_err(db_err)?;
            let rows = stmt
                .query_map(params![project_dir, workflow_name, since_started_at], row_to_run)
                .map_err(db_err)?
                .collect::<Result<Vec<_>, _>>()
                .map_err(db_err)?;
            Ok(rows)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cloche_common::persistence::{completed_capture, started_capture};
    use std::path::PathBuf;

    fn sample_run(id: &str) -> Run {
        Run::pending(RunId::new(id), "demo", PathBuf::from("/tmp/project"))
    }

    #[tokio::test]
    async fn create_and_get_round_trips() {
        let store = SqliteStore::open_in_memory().unwrap();
        let run = sample_run("run-1");
        store.create_run(&run).await.unwrap();
        let fetched = store.get_run(&run.id).await.unwrap();
        assert_eq!(fetched.workflow_name, "demo");
        assert_eq!(fetched.state, RunState::Pending);
    }

    #[tokio::test]
    async fn get_run_on_unknown_id_returns_not_found() {
        let store = SqliteStore::open_in_memory().unwrap();
        let err = store.get_run(&RunId::new("missing")).await.unwrap_err();
        assert!(matches!(err, StoreError::RunNotFound(_)));
    }

    #[tokio::test]
    async fn update_run_state_sets_completed_at_on_terminal_states() {
        let store = SqliteStore::open_in_memory().unwrap();
        let run = sample_run("run-1");
        store.create_run(&run).await.unwrap();
        store.update_run_state(&run.id, RunState::Succeeded, None).await.unwrap();
        let fetched = store.get_run(&run.id).await.unwrap();
        assert_eq!(fetched.state, RunState::Succeeded);
        assert!(fetched.completed_at.is_some());
    }

    #[tokio::test]
    async fn list_runs_orders_most_recent_first() {
        let store = SqliteStore::open_in_memory().unwrap();
        let mut first = sample_run("run-1");
        first.started_at = Utc::now() - chrono::Duration::seconds(10);
        let second = sample_run("run-2");
        store.create_run(&first).await.unwrap();
        store.create_run(&second).await.unwrap();

        let runs = store.list_runs().await.unwrap();
        assert_eq!(runs[0].id.as_str(), "run-2");
        assert_eq!(runs[1].id.as_str(), "run-1");
    }

    #[tokio::test]
    async fn captures_preserve_insertion_order() {
        let store = SqliteStore::open_in_memory().unwrap();
        let run = sample_run("run-1");
        store.create_run(&run).await.unwrap();

        store
            .append_capture(&started_capture(run.id.clone(), "build", Some("do it".to_string())))
            .await
            .unwrap();
        store
            .append_capture(&completed_capture(run.id.clone(), "build", "success", None, 1, Some("log".to_string())))
            .await
            .unwrap();

        let captures = store.list_captures(&run.id).await.unwrap();
        assert_eq!(captures.len(), 2);
        assert_eq!(captures[0].phase, CapturePhase::Started);
        assert_eq!(captures[1].phase, CapturePhase::Completed);
    }

    #[tokio::test]
    async fn fail_all_incomplete_runs_leaves_terminal_runs_untouched() {
        let store = SqliteStore::open_in_memory().unwrap();
        let pending = sample_run("run-pending");
        let mut succeeded = sample_run("run-succeeded");
        succeeded.state = RunState::Succeeded;
        store.create_run(&pending).await.unwrap();
        store.create_run(&succeeded).await.unwrap();

        store.fail_all_incomplete_runs("daemon restarted").await.unwrap();

        assert_eq!(store.get_run(&pending.id).await.unwrap().state, RunState::Failed);
        assert_eq!(store.get_run(&succeeded.id).await.unwrap().state, RunState::Succeeded);
    }
}
