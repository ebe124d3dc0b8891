//! Thin dispatcher for the `cloche-runner` binary: parse args, init tracing,
//! drive `cloche_runner::run`, and relay its status-stream messages to
//! stdout as they arrive.

use tokio::io::{AsyncWriteExt, Stdout};
use tokio::sync::mpsc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cloche_common::StatusMessage;
use cloche_runner::RunnerConfig;

/// Set `CLOCHE_LOG` for a `tracing_subscriber::EnvFilter` directive
/// (defaults to `warn`); set `LOG_FORMAT=json` for structured output.
fn init_tracing() {
    let filter = std::env::var("CLOCHE_LOG")
        .ok()
        .and_then(|v| tracing_subscriber::EnvFilter::try_new(v).ok())
        .unwrap_or_else(|| tracing_subscriber::EnvFilter::new("warn"));

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
async fn main() {
    init_tracing();

    let config = match RunnerConfig::from_args_and_env(std::env::args().skip(1)) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("cloche-runner: {err}");
            std::process::exit(2);
        }
    };

    let (tx, rx) = mpsc::unbounded_channel::<StatusMessage>();
    let writer = tokio::spawn(relay_to_stdout(rx));

    let result = cloche_runner::run(config, tx).await;
    let _ = writer.await;

    let code = match result.state {
        cloche_common::RunState::Succeeded => 0,
        _ => 1,
    };
    std::process::exit(code);
}

/// Drains status messages to stdout as JSON lines until the sender side
/// (held by `cloche_runner::run`) is dropped.
async fn relay_to_stdout(mut rx: mpsc::UnboundedReceiver<StatusMessage>) {
    let mut stdout: Stdout = tokio::io::stdout();
    while let Some(msg) = rx.recv().await {
        match msg.to_line() {
            Ok(line) => {
                let _ = stdout.write_all(line.as_bytes()).await;
                let _ = stdout.write_all(b"\n").await;
                let _ = stdout.flush().await;
            }
            Err(err) => tracing::error!(error = %err, "failed to serialize status message"),
        }
    }
}
