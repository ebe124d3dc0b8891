//! The workflow graph model: steps, wires, collects.
//!
//! This is pure data — no parsing and no execution live here. The DSL
//! crate builds a `Workflow`; the engine crate consumes one.

use std::collections::HashMap;

/// What kind of work a step performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind {
    /// A shell command, dispatched to the script adapter.
    Script,
    /// An LLM prompt, dispatched to the prompt adapter.
    Agent,
}

/// One step in a workflow.
#[derive(Debug, Clone)]
pub struct Step {
    pub name: String,
    pub kind: StepKind,
    /// Declared result names, in declaration order. Non-empty, unique.
    pub results: Vec<String>,
    /// Flattened config keys (nested blocks become dotted keys, e.g.
    /// `container.image`).
    pub config: HashMap<String, String>,
}

impl Step {
    pub fn declares_result(&self, result: &str) -> bool {
        self.results.iter().any(|r| r == result)
    }

    pub fn config_get(&self, key: &str) -> Option<&str> {
        self.config.get(key).map(String::as_str)
    }
}

/// The reserved termination targets, or a named step.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Target {
    Step(String),
    Done,
    Abort,
}

impl Target {
    pub fn from_name(name: &str) -> Self {
        match name {
            "done" => Target::Done,
            "abort" => Target::Abort,
            other => Target::Step(other.to_string()),
        }
    }

    pub fn as_step_name(&self) -> Option<&str> {
        match self {
            Target::Step(name) => Some(name.as_str()),
            _ => None,
        }
    }
}

/// A directed edge: `from_step:result_name -> to_target`.
#[derive(Debug, Clone)]
pub struct Wire {
    pub from_step: String,
    pub result_name: String,
    pub to_target: Target,
}

/// Synchronization mode for a `Collect` barrier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectMode {
    All,
    Any,
}

/// A multi-input barrier: fires at most once per run.
#[derive(Debug, Clone)]
pub struct Collect {
    pub mode: CollectMode,
    /// (step_name, result_name) conditions. Non-empty.
    pub conditions: Vec<(String, String)>,
    pub target: Target,
}

impl Collect {
    pub fn matches(&self, step_name: &str, result_name: &str) -> bool {
        self.conditions
            .iter()
            .any(|(s, r)| s == step_name && r == result_name)
    }
}

/// A fully parsed (but not necessarily validated) workflow graph.
#[derive(Debug, Clone)]
pub struct Workflow {
    pub name: String,
    /// The entry step's name — the first `step` block declared.
    pub entry: String,
    pub steps: Vec<Step>,
    pub wires: Vec<Wire>,
    pub collects: Vec<Collect>,
    /// Workflow-level config, e.g. `container.image`, `agent_command`.
    pub config: HashMap<String, String>,
}

impl Workflow {
    pub fn step(&self, name: &str) -> Option<&Step> {
        self.steps.iter().find(|s| s.name == name)
    }

    pub fn entry_step(&self) -> Option<&Step> {
        self.step(&self.entry)
    }

    /// Wires whose `(from_step, result_name)` matches, in declaration order.
    pub fn wires_from(&self, step_name: &str, result_name: &str) -> Vec<&Wire> {
        self.wires
            .iter()
            .filter(|w| w.from_step == step_name && w.result_name == result_name)
            .collect()
    }

    pub fn config_get(&self, key: &str) -> Option<&str> {
        self.config.get(key).map(String::as_str)
    }
}
