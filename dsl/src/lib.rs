//! The `.cloche` workflow language: lexer, recursive-descent parser, and a
//! standalone validator for the §3 graph invariants.

pub mod error;
pub mod lexer;
pub mod parser;
pub mod validator;

pub use error::{ParseError, ValidationError};
pub use parser::parse;
pub use validator::validate;

use cloche_common::workflow::Workflow;

/// Parse and validate in one step — the entry point most callers want.
pub fn parse_and_validate(source: &str) -> Result<Workflow, LoadError> {
    let workflow = parse(source)?;
    validate(&workflow)?;
    Ok(workflow)
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum LoadError {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_and_validate_accepts_the_scenario_1_workflow() {
        let wf = parse_and_validate(
            r#"
            workflow "demo" {
                step build {
                    run = "echo ok"
                    results = [success, fail]
                }
                build:success -> done
                build:fail -> abort
            }
        "#,
        )
        .unwrap();
        assert_eq!(wf.name, "demo");
    }

    #[test]
    fn parse_and_validate_rejects_a_dangling_result() {
        let result = parse_and_validate(
            r#"
            workflow "demo" {
                step build { run = "echo" results = [success, fail] }
                build:success -> done
            }
        "#,
        );
        assert!(matches!(result, Err(LoadError::Validation(_))));
    }
}
