//! Thin dispatcher for the `cloche-daemon` binary: init tracing, build the
//! config/store/runtime, run the startup sweep, serve RPCs. Config file
//! loading and a `clap` subcommand tree are both out of scope (spec §1) —
//! this binary reads its configuration entirely from the environment
//! (§6.4) and exposes no flags of its own.

use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cloche_daemon::{DaemonConfig, DaemonServer, DaemonState};
use cloche_runtime_local::LocalRuntime;

fn init_tracing() {
    let filter = std::env::var("CLOCHE_LOG")
        .ok()
        .and_then(|v| tracing_subscriber::EnvFilter::try_new(v).ok())
        .unwrap_or_else(|| tracing_subscriber::EnvFilter::new("info"));

    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    if use_json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = DaemonConfig::from_env();
    let store = cloche_persistence::SqliteStore::open(&config.run_db_path)?;

    let runtime: Option<Arc<dyn cloche_common::Runtime>> = if config.runtime_kind == "local" {
        Some(Arc::new(LocalRuntime::new(config.agent_binary_path.clone())))
    } else {
        tracing::warn!(kind = %config.runtime_kind, "no built-in Runtime for this kind; RunWorkflow will fail");
        None
    };

    let listen_addr = config.listen_addr.clone();
    let state = DaemonState::new(config, Arc::new(store), runtime);
    state.startup_sweep().await?;

    DaemonServer::new(state).run(&listen_addr).await?;
    Ok(())
}
