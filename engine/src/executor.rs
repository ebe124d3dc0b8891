//! The `StepExecutor` seam (spec §4.2): the engine knows nothing about
//! shells, prompts, or subprocesses — it only asks an executor to run one
//! step and hand back the declared result name it produced.

use async_trait::async_trait;
use cloche_common::workflow::Step;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StepExecutionError {
    #[error("step '{step}' failed: {reason}")]
    Failed { step: String, reason: String },
}

#[async_trait]
pub trait StepExecutor: Send + Sync {
    /// Run one step to completion and return the result name it declared.
    /// Returning `Ok` with a name the step never declared is a valid (if
    /// buggy) executor response — the engine, not the executor, is
    /// responsible for rejecting undeclared results.
    async fn execute(&self, step: &Step) -> Result<String, StepExecutionError>;
}
