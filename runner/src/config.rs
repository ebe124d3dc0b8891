//! Runner inputs (spec §4.3): workflow path, working directory, plus the
//! environment-variable overrides named in §6.4. No `clap` — CLI front-ends
//! are out of scope, so this is the thinnest possible positional-argument
//! parse, matching `RunnerConfig`'s role as a plain data struct rather than
//! a flag tree.

use std::path::PathBuf;

use cloche_common::RunId;

use crate::error::RunnerError;

#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub workflow_path: PathBuf,
    pub workdir: PathBuf,
    /// Present when the caller (daemon) supplied `RUN_ID`; absent for a bare
    /// standalone invocation. Result publication is gated on this being
    /// `Some` (spec §4.3: "if run id and remote URL are both configured").
    pub run_id: Option<RunId>,
    pub git_remote: Option<String>,
    /// `AGENT_COMMAND` override (spec §6.4), lowest-precedence above the
    /// built-in default.
    pub agent_command_env: Option<String>,
}

impl RunnerConfig {
    /// Builds a config from CLI positional args (`workflow_path`, `workdir`)
    /// and the environment (`RUN_ID`, `GIT_REMOTE`, `AGENT_COMMAND`).
    pub fn from_args_and_env(mut args: impl Iterator<Item = String>) -> Result<Self, RunnerError> {
        let workflow_path = args.next().ok_or(RunnerError::MissingArg("workflow_path"))?;
        let workdir = args.next().ok_or(RunnerError::MissingArg("workdir"))?;

        Ok(Self {
            workflow_path: PathBuf::from(workflow_path),
            workdir: PathBuf::from(workdir),
            run_id: std::env::var("RUN_ID").ok().map(RunId::new),
            git_remote: std::env::var("GIT_REMOTE").ok(),
            agent_command_env: std::env::var("AGENT_COMMAND").ok(),
        })
    }

    /// The run id used for status messages and scratch-state paths, whether
    /// or not the caller supplied one.
    pub fn effective_run_id(&self) -> RunId {
        self.run_id.clone().unwrap_or_else(RunId::generate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_positional_workflow_and_workdir() {
        let config = RunnerConfig::from_args_and_env(
            vec!["wf.cloche".to_string(), "/tmp/project".to_string()].into_iter(),
        )
        .unwrap();
        assert_eq!(config.workflow_path, PathBuf::from("wf.cloche"));
        assert_eq!(config.workdir, PathBuf::from("/tmp/project"));
    }

    #[test]
    fn missing_workdir_is_an_error() {
        let result = RunnerConfig::from_args_and_env(vec!["wf.cloche".to_string()].into_iter());
        assert!(matches!(result, Err(RunnerError::MissingArg("workdir"))));
    }
}
