//! Schema definitions and migrations for the `runs`/`captures` tables,
//! mirroring the teacher's `db/schema.rs` version-stamped `create_tables`.

use rusqlite::Connection;

pub const SCHEMA_VERSION: i32 = 1;

pub fn create_tables(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS runs (
            id TEXT PRIMARY KEY,
            workflow_name TEXT NOT NULL,
            project_dir TEXT NOT NULL,
            state TEXT NOT NULL,
            active_steps TEXT NOT NULL,
            started_at TEXT NOT NULL,
            completed_at TEXT,
            error TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_runs_started
        ON runs(started_at DESC);

        CREATE INDEX IF NOT EXISTS idx_runs_project_workflow
        ON runs(project_dir, workflow_name, started_at);

        CREATE TABLE IF NOT EXISTS captures (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            run_id TEXT NOT NULL,
            step_name TEXT NOT NULL,
            phase TEXT NOT NULL,
            prompt_text TEXT,
            started_at TEXT,
            completed_at TEXT,
            result TEXT,
            agent_output TEXT,
            attempt_number INTEGER,
            script_logs TEXT,
            FOREIGN KEY (run_id) REFERENCES runs(id) ON DELETE CASCADE
        );

        CREATE INDEX IF NOT EXISTS idx_captures_run
        ON captures(run_id, id);

        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        );

        INSERT OR IGNORE INTO schema_version (version) VALUES (1);
        "#,
    )
}

#[allow(dead_code)]
pub fn get_version(conn: &Connection) -> rusqlite::Result<i32> {
    conn.query_row(
        "SELECT version FROM schema_version ORDER BY version DESC LIMIT 1",
        [],
        |row| row.get(0),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creates_runs_and_captures_tables() {
        let conn = Connection::open_in_memory().unwrap();
        create_tables(&conn).unwrap();
        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        assert!(tables.contains(&"runs".to_string()));
        assert!(tables.contains(&"captures".to_string()));
    }

    #[test]
    fn reports_current_schema_version() {
        let conn = Connection::open_in_memory().unwrap();
        create_tables(&conn).unwrap();
        assert_eq!(get_version(&conn).unwrap(), SCHEMA_VERSION);
    }
}
