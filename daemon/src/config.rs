//! Daemon configuration (spec §2 ambient-stack clarification, §6.4): a
//! plain struct populated from environment variables, built the way
//! `agent::config::AgentFileConfig` is — no ad hoc `std::env::var` calls
//! scattered through the supervisor or RPC handlers.

use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct DaemonConfig {
    /// `RUN_DB_PATH` — where the sqlite run/capture database lives.
    pub run_db_path: PathBuf,
    /// `LISTEN_ADDR` — the Unix domain socket path the RPC server binds.
    pub listen_addr: PathBuf,
    /// `DEFAULT_IMAGE` — the container image a future container `Runtime`
    /// would default to. Unused by `cloche-runtime-local`; carried so the
    /// config surface matches §6.4 in full.
    pub default_image: Option<String>,
    /// `RUNTIME_KIND` — which concrete `Runtime` to construct. Only
    /// `"local"` has a built-in implementation.
    pub runtime_kind: String,
    /// `AGENT_BINARY_PATH` — the runner binary `cloche-runtime-local`
    /// spawns for each run.
    pub agent_binary_path: PathBuf,
    /// `FRIENDLY_RUN_IDS` — use the `run-<adjective>-<noun>-<noun>` id form
    /// instead of the default `run-<unix_nanos>` form (spec §3).
    pub friendly_run_ids: bool,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            run_db_path: PathBuf::from("cloche-runs.db"),
            listen_addr: PathBuf::from("/tmp/cloche-daemon.sock"),
            default_image: None,
            runtime_kind: "local".to_string(),
            agent_binary_path: PathBuf::from("cloche-runner"),
            friendly_run_ids: false,
        }
    }
}

impl DaemonConfig {
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            run_db_path: std::env::var("RUN_DB_PATH").map(PathBuf::from).unwrap_or(default.run_db_path),
            listen_addr: std::env::var("LISTEN_ADDR").map(PathBuf::from).unwrap_or(default.listen_addr),
            default_image: std::env::var("DEFAULT_IMAGE").ok(),
            runtime_kind: std::env::var("RUNTIME_KIND").unwrap_or(default.runtime_kind),
            agent_binary_path: std::env::var("AGENT_BINARY_PATH")
                .map(PathBuf::from)
                .unwrap_or(default.agent_binary_path),
            friendly_run_ids: std::env::var("FRIENDLY_RUN_IDS")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(default.friendly_run_ids),
        }
    }
}
