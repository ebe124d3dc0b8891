//! Adapter-level failures (spec §4.4, §4.5, §7 `StepExecutionError`).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("step '{step}' has no 'run' command configured")]
    MissingRunCommand { step: String },

    #[error("step '{step}' has no 'prompt' configured")]
    MissingPrompt { step: String },

    #[error("failed to spawn command for step '{step}': {source}")]
    Spawn {
        step: String,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error for step '{step}': {source}")]
    Io {
        step: String,
        #[source]
        source: std::io::Error,
    },

    #[error("step '{step}' references an unreadable prompt file '{path}': {source}")]
    PromptFile {
        step: String,
        path: String,
        #[source]
        source: std::io::Error,
    },
}
