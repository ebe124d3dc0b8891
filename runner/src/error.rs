//! Error type for the runner binary's top-level flow.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("missing required argument: {0}")]
    MissingArg(&'static str),
    #[error("failed to read workflow file {path}: {source}")]
    ReadWorkflow { path: String, source: std::io::Error },
    #[error(transparent)]
    Load(#[from] cloche_dsl::LoadError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
