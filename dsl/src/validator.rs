//! Enforces the §3 graph invariants after parsing. Kept separate from the
//! parser so tests can build a `Workflow` directly and validate it without
//! going through source text.

use std::collections::{HashSet, VecDeque};

use cloche_common::workflow::{Target, Workflow};

use crate::error::ValidationError;

pub fn validate(workflow: &Workflow) -> Result<(), ValidationError> {
    if workflow.steps.is_empty() {
        return Err(ValidationError::NoSteps);
    }

    let mut seen_names = HashSet::new();
    for step in &workflow.steps {
        if !seen_names.insert(step.name.as_str()) {
            return Err(ValidationError::DuplicateStep(step.name.clone()));
        }
        if step.results.is_empty() {
            return Err(ValidationError::NoResults {
                step: step.name.clone(),
            });
        }
        let mut seen_results = HashSet::new();
        for result in &step.results {
            if !seen_results.insert(result.as_str()) {
                return Err(ValidationError::DuplicateResult {
                    step: step.name.clone(),
                    result: result.clone(),
                });
            }
        }
    }

    for wire in &workflow.wires {
        if workflow.step(&wire.from_step).is_none() {
            return Err(ValidationError::UnknownWireSource(wire.from_step.clone()));
        }
        if let Target::Step(target_name) = &wire.to_target {
            if workflow.step(target_name).is_none() {
                return Err(ValidationError::UnknownWireTarget {
                    target: target_name.clone(),
                });
            }
        }
    }

    for collect in &workflow.collects {
        if collect.conditions.is_empty() {
            return Err(ValidationError::EmptyCollect);
        }
        if let Target::Step(target_name) = &collect.target {
            if workflow.step(target_name).is_none() {
                return Err(ValidationError::UnknownWireTarget {
                    target: target_name.clone(),
                });
            }
        }
        for (step_name, result_name) in &collect.conditions {
            match workflow.step(step_name) {
                None => {
                    return Err(ValidationError::UnknownCollectStep {
                        step: step_name.clone(),
                        result: result_name.clone(),
                    })
                }
                Some(step) if !step.declares_result(result_name) => {
                    return Err(ValidationError::UnknownCollectResult {
                        step: step_name.clone(),
                        result: result_name.clone(),
                    })
                }
                Some(_) => {}
            }
        }
    }

    // Invariant 2: every declared result is wired or claimed by a collect.
    for step in &workflow.steps {
        for result in &step.results {
            let wired = !workflow.wires_from(&step.name, result).is_empty();
            let collected = workflow
                .collects
                .iter()
                .any(|c| c.matches(&step.name, result));
            if !wired && !collected {
                return Err(ValidationError::DanglingResult {
                    step: step.name.clone(),
                    result: result.clone(),
                });
            }
        }
    }

    // Invariant 4: every non-entry step is reachable from the entry via
    // wires and collect targets.
    let reachable = reachable_steps(workflow);
    for step in &workflow.steps {
        if step.name != workflow.entry && !reachable.contains(step.name.as_str()) {
            return Err(ValidationError::UnreachableStep(step.name.clone()));
        }
    }

    Ok(())
}

fn reachable_steps(workflow: &Workflow) -> HashSet<&str> {
    let mut visited: HashSet<&str> = HashSet::new();
    let mut queue: VecDeque<&str> = VecDeque::new();
    visited.insert(workflow.entry.as_str());
    queue.push_back(workflow.entry.as_str());

    while let Some(step_name) = queue.pop_front() {
        for wire in workflow.wires.iter().filter(|w| w.from_step == step_name) {
            if let Target::Step(target) = &wire.to_target {
                if visited.insert(target.as_str()) {
                    queue.push_back(target.as_str());
                }
            }
        }
        for collect in &workflow.collects {
            if collect.conditions.iter().any(|(s, _)| s == step_name) {
                if let Target::Step(target) = &collect.target {
                    if visited.insert(target.as_str()) {
                        queue.push_back(target.as_str());
                    }
                }
            }
        }
    }

    visited
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    #[test]
    fn accepts_a_valid_linear_workflow() {
        let wf = parse(
            r#"
            workflow "demo" {
                step build { run = "echo" results = [success, fail] }
                build:success -> done
                build:fail -> abort
            }
        "#,
        )
        .unwrap();
        assert!(validate(&wf).is_ok());
    }

    #[test]
    fn rejects_a_dangling_result() {
        let wf = parse(
            r#"
            workflow "demo" {
                step build { run = "echo" results = [success, fail] }
                build:success -> done
            }
        "#,
        )
        .unwrap();
        assert_eq!(
            validate(&wf),
            Err(ValidationError::DanglingResult {
                step: "build".to_string(),
                result: "fail".to_string(),
            })
        );
    }

    #[test]
    fn rejects_an_unreachable_step() {
        let wf = parse(
            r#"
            workflow "demo" {
                step build { run = "echo" results = [success] }
                step orphan { run = "echo" results = [success] }
                build:success -> done
                orphan:success -> done
            }
        "#,
        )
        .unwrap();
        assert_eq!(
            validate(&wf),
            Err(ValidationError::UnreachableStep("orphan".to_string()))
        );
    }

    #[test]
    fn rejects_a_wire_to_an_unknown_step() {
        let wf = parse(
            r#"
            workflow "demo" {
                step build { run = "echo" results = [success] }
                build:success -> nonexistent
            }
        "#,
        )
        .unwrap();
        assert_eq!(
            validate(&wf),
            Err(ValidationError::UnknownWireTarget {
                target: "nonexistent".to_string(),
            })
        );
    }

    #[test]
    fn accepts_a_collect_barrier_reaching_done() {
        let wf = parse(
            r#"
            workflow "fanout" {
                step code { run = "echo" results = [success] }
                step test { run = "echo" results = [pass] }
                step lint { run = "echo" results = [pass] }
                step merge { run = "echo" results = [ok] }
                code:success -> test
                code:success -> lint
                collect all(test:pass, lint:pass) -> merge
                merge:ok -> done
            }
        "#,
        )
        .unwrap();
        assert!(validate(&wf).is_ok());
    }

    #[test]
    fn rejects_a_collect_condition_naming_an_undeclared_result() {
        let wf = parse(
            r#"
            workflow "demo" {
                step a { run = "echo" results = [ok] }
                step b { run = "echo" results = [ok] }
                a:ok -> b
                collect all(a:ok, b:missing) -> done
            }
        "#,
        )
        .unwrap();
        assert_eq!(
            validate(&wf),
            Err(ValidationError::UnknownCollectResult {
                step: "b".to_string(),
                result: "missing".to_string(),
            })
        );
    }
}
