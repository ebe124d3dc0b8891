//! Parse and validation error types (spec §4.1, §7).

use thiserror::Error;

/// A lex or parse failure, always tied to a source position.
#[derive(Debug, Clone, Error)]
#[error("{line}:{column}: unexpected {found}, expected {expected}")]
pub struct ParseError {
    pub line: usize,
    pub column: usize,
    pub found: String,
    pub expected: String,
}

/// A structurally valid workflow that fails one of the §3 graph invariants.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("step '{step}' has duplicate declared result '{result}'")]
    DuplicateResult { step: String, result: String },
    #[error("step '{step}' declares no results")]
    NoResults { step: String },
    #[error("wire target '{target}' names a step that does not exist")]
    UnknownWireTarget { target: String },
    #[error("wire source '{0}' names a step that does not exist")]
    UnknownWireSource(String),
    #[error("collect condition '{step}:{result}' references a step that does not exist")]
    UnknownCollectStep { step: String, result: String },
    #[error("collect condition '{step}:{result}' references a result '{step}' never declares")]
    UnknownCollectResult { step: String, result: String },
    #[error("collect has no conditions")]
    EmptyCollect,
    #[error("step '{step}' result '{result}' is never wired to a target or claimed by a collect")]
    DanglingResult { step: String, result: String },
    #[error("step '{0}' is unreachable from the entry step")]
    UnreachableStep(String),
    #[error("workflow declares no steps")]
    NoSteps,
    #[error("duplicate step name '{0}'")]
    DuplicateStep(String),
}
