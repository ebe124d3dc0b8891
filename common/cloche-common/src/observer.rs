//! The `StepObserver` seam: how adapters report the richer, adapter-specific
//! half of a step observation (assembled prompt text, agent output, attempt
//! number, script logs) that the engine's `StepExecutor` trait deliberately
//! does not carry — the engine only ever sees a declared result name back.
//!
//! The runner is the one implementation: it turns these callbacks into the
//! §6.2 status-stream JSON lines. Splitting it from `engine::EngineEvent`
//! keeps the engine crate ignorant of prompts, subprocess output, and
//! attempt counters, the same way `PersistenceStore` keeps the engine
//! ignorant of SQL.

use async_trait::async_trait;

/// Observes one step's adapter-level lifecycle. Called by the concrete
/// `StepExecutor` the runner builds on top of the script/prompt adapters,
/// around the call into the underlying adapter — never by the engine
/// itself.
#[async_trait]
pub trait StepObserver: Send + Sync {
    /// The step has begun; for agent steps, the assembled prompt text that
    /// will be piped to the LLM command.
    async fn step_started(&self, step_name: &str, prompt_text: Option<String>);

    /// The step has produced a result. `agent_output` and `script_logs` are
    /// populated depending on step kind; `attempt_number` is meaningful only
    /// for agent steps (starts at 1).
    async fn step_completed(
        &self,
        step_name: &str,
        result: &str,
        agent_output: Option<String>,
        attempt_number: u32,
        script_logs: Option<String>,
    );
}

/// An observer that does nothing — the default for callers (engine unit
/// tests, tools that only care about the terminal run state) that don't
/// need the capture stream.
pub struct NullObserver;

#[async_trait]
impl StepObserver for NullObserver {
    async fn step_started(&self, _step_name: &str, _prompt_text: Option<String>) {}

    async fn step_completed(
        &self,
        _step_name: &str,
        _result: &str,
        _agent_output: Option<String>,
        _attempt_number: u32,
        _script_logs: Option<String>,
    ) {
    }
}
