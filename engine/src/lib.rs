//! The concurrent execution engine (spec §4.2).
//!
//! `run` drives one validated [`Workflow`] to a terminal [`RunState`] against
//! an injected [`StepExecutor`]. It is the single coordinator of run state:
//! step tasks never touch the workflow or the active set directly, they only
//! report completion back over a bounded channel (spec §5, §9 — "the
//! engine's scheduling primitive should be a bounded completion channel
//! sized to the step-count ceiling").

pub mod executor;

pub use executor::{StepExecutionError, StepExecutor};

use std::collections::HashSet;
use std::sync::Arc;

use cloche_common::workflow::{Target, Workflow};
use cloche_common::RunState;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Default per-run step-launch ceiling (spec §4.2): guards against wiring
/// loops that cannot make progress.
pub const DEFAULT_STEP_LIMIT: usize = 1000;

/// Progress notification the engine emits as it runs. Consumed only by the
/// runner (spec §4.2 supplemental) — the engine has no notion of JSON or
/// stdout.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    StepLaunched { step_name: String },
    StepCompleted { step_name: String, result: String },
    CollectFired { target: Target },
    RunTerminal { state: RunState, error: Option<String> },
}

/// What a run produced: a terminal [`RunState`] plus an optional error
/// message (spec §7 — only the non-succeeded states carry one).
#[derive(Debug, Clone)]
pub struct RunResult {
    pub state: RunState,
    pub error: Option<String>,
}

impl RunResult {
    fn succeeded() -> Self {
        Self { state: RunState::Succeeded, error: None }
    }

    fn failed(error: impl Into<String>) -> Self {
        Self { state: RunState::Failed, error: Some(error.into()) }
    }

    fn cancelled() -> Self {
        Self { state: RunState::Cancelled, error: None }
    }
}

/// One step task's report back to the coordinator.
type Completion = (String, Result<String, StepExecutionError>);

/// Runs `workflow` to completion against `executor`, emitting [`EngineEvent`]s
/// on `events` as it goes. `cancel` is an external cancellation signal (spec
/// §5); when triggered, the engine stops launching new steps, drains
/// whatever completions are already in flight without acting on them, and
/// returns `RunState::Cancelled`.
///
/// `workflow` is `Arc`-shared rather than borrowed so step tasks (which must
/// be `'static` to be spawned) can read it without the engine cloning the
/// whole graph per step.
pub async fn run(
    workflow: Arc<Workflow>,
    executor: Arc<dyn StepExecutor>,
    events: mpsc::UnboundedSender<EngineEvent>,
    cancel: CancellationToken,
) -> RunResult {
    run_with_step_limit(workflow, executor, events, cancel, DEFAULT_STEP_LIMIT).await
}

/// As [`run`], but with an explicit step-launch ceiling — mainly so tests
/// can exercise `StepLimitExceeded` without spinning up a thousand steps.
pub async fn run_with_step_limit(
    workflow: Arc<Workflow>,
    executor: Arc<dyn StepExecutor>,
    events: mpsc::UnboundedSender<EngineEvent>,
    cancel: CancellationToken,
    step_limit: usize,
) -> RunResult {
    let mut coordinator = Coordinator {
        workflow,
        executor,
        events,
        cancel,
        active: HashSet::new(),
        launched_total: 0,
        done_count: 0,
        aborted: false,
        step_limit,
        collect_satisfied: vec![HashSet::new(); 0],
        collect_fired: Vec::new(),
    };
    coordinator.collect_satisfied = coordinator
        .workflow
        .collects
        .iter()
        .map(|_| HashSet::new())
        .collect();
    coordinator.collect_fired = vec![false; coordinator.workflow.collects.len()];

    let result = coordinator.drive().await;
    let _ = coordinator.events.send(EngineEvent::RunTerminal {
        state: result.state,
        error: result.error.clone(),
    });
    result
}

struct Coordinator {
    workflow: Arc<Workflow>,
    executor: Arc<dyn StepExecutor>,
    events: mpsc::UnboundedSender<EngineEvent>,
    cancel: CancellationToken,
    active: HashSet<String>,
    launched_total: usize,
    done_count: usize,
    aborted: bool,
    step_limit: usize,
    /// Per-collect set of condition indices satisfied at least once.
    collect_satisfied: Vec<HashSet<usize>>,
    collect_fired: Vec<bool>,
}

enum Outcome {
    Continue,
    Terminate(RunResult),
}

impl Coordinator {
    async fn drive(&mut self) -> RunResult {
        let (tx, mut rx) = mpsc::channel::<Completion>(self.step_limit.max(1));

        let entry = self.workflow.entry.clone();
        if self.workflow.step(&entry).is_none() {
            return RunResult::failed(format!("entry step '{entry}' does not exist"));
        }
        self.launch(&entry, &tx);

        loop {
            if self.active.is_empty() {
                return self.terminal_result();
            }

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    return self.drain_cancelled(rx).await;
                }
                maybe = rx.recv() => {
                    let Some((step_name, outcome)) = maybe else {
                        // Channel closed with tasks still marked active: treat
                        // as an internal failure rather than hang forever.
                        return RunResult::failed("completion channel closed unexpectedly");
                    };
                    match self.handle_completion(step_name, outcome, &tx) {
                        Outcome::Continue => {}
                        Outcome::Terminate(result) => return result,
                    }
                }
            }
        }
    }

    async fn drain_cancelled(&mut self, mut rx: mpsc::Receiver<Completion>) -> RunResult {
        // Drain whatever is already in flight; results are discarded per
        // spec §5 ("their results are discarded except for ordering
        // purposes") — we simply stop processing them against the graph.
        while !self.active.is_empty() {
            match rx.recv().await {
                Some((step_name, _outcome)) => {
                    self.active.remove(&step_name);
                }
                None => break,
            }
        }
        RunResult::cancelled()
    }

    fn launch(&mut self, step_name: &str, tx: &mpsc::Sender<Completion>) {
        self.active.insert(step_name.to_string());
        let _ = self.events.send(EngineEvent::StepLaunched {
            step_name: step_name.to_string(),
        });

        let workflow = Arc::clone(&self.workflow);
        let executor = Arc::clone(&self.executor);
        let tx = tx.clone();
        let step_name = step_name.to_string();

        tokio::spawn(async move {
            let step = workflow
                .step(&step_name)
                .expect("engine only launches steps that exist in the workflow")
                .clone();
            let outcome = executor.execute(&step).await;
            let _ = tx.send((step_name, outcome)).await;
        });
    }

    fn handle_completion(
        &mut self,
        step_name: String,
        outcome: Result<String, StepExecutionError>,
        tx: &mpsc::Sender<Completion>,
    ) -> Outcome {
        self.active.remove(&step_name);

        let result_name = match outcome {
            Ok(name) => name,
            Err(err) => {
                return Outcome::Terminate(RunResult::failed(err.to_string()));
            }
        };

        let Some(step) = self.workflow.step(&step_name) else {
            return Outcome::Terminate(RunResult::failed(format!(
                "completion for unknown step '{step_name}'"
            )));
        };
        if !step.declares_result(&result_name) {
            return Outcome::Terminate(RunResult::failed(format!(
                "step '{step_name}' returned undeclared result '{result_name}'"
            )));
        }

        let _ = self.events.send(EngineEvent::StepCompleted {
            step_name: step_name.clone(),
            result: result_name.clone(),
        });

        self.launched_total += 1;
        if self.launched_total > self.step_limit {
            return Outcome::Terminate(RunResult::failed(format!(
                "run exceeded the step-launch limit of {}",
                self.step_limit
            )));
        }

        let wires = self.workflow.wires_from(&step_name, &result_name);
        let collected = self
            .workflow
            .collects
            .iter()
            .any(|c| c.matches(&step_name, &result_name));

        if wires.is_empty() && !collected {
            return Outcome::Terminate(RunResult::failed(format!(
                "step '{step_name}' result '{result_name}' has no wire or collect to consume it"
            )));
        }

        let targets: Vec<Target> = wires.into_iter().map(|w| w.to_target.clone()).collect();
        for target in targets {
            self.dispatch(target, tx);
        }

        // Collect evaluation happens after wiring dispatch (spec §9,
        // "Collect firing timing") so wire and collect targets from the same
        // completion both get scheduled.
        self.evaluate_collects(&step_name, &result_name, tx);

        Outcome::Continue
    }

    fn dispatch(&mut self, target: Target, tx: &mpsc::Sender<Completion>) {
        match target {
            Target::Done => self.done_count += 1,
            Target::Abort => self.aborted = true,
            Target::Step(name) => {
                // Per-step concurrency invariant (spec §9): never re-launch
                // an already-active step; coalesce instead.
                if !self.active.contains(&name) {
                    self.launch(&name, tx);
                }
            }
        }
    }

    fn evaluate_collects(&mut self, step_name: &str, result_name: &str, tx: &mpsc::Sender<Completion>) {
        for idx in 0..self.workflow.collects.len() {
            if self.collect_fired[idx] {
                continue;
            }
            let collect = self.workflow.collects[idx].clone();
            let mut newly_satisfied = None;
            for (cond_idx, (cstep, cresult)) in collect.conditions.iter().enumerate() {
                if cstep == step_name && cresult == result_name {
                    self.collect_satisfied[idx].insert(cond_idx);
                    newly_satisfied = Some(cond_idx);
                }
            }
            if newly_satisfied.is_none() {
                continue;
            }

            let fires = match collect.mode {
                cloche_common::workflow::CollectMode::Any => true,
                cloche_common::workflow::CollectMode::All => {
                    self.collect_satisfied[idx].len() == collect.conditions.len()
                }
            };

            if fires {
                self.collect_fired[idx] = true;
                let _ = self.events.send(EngineEvent::CollectFired {
                    target: collect.target.clone(),
                });
                self.dispatch(collect.target.clone(), tx);
            }
        }
    }

    fn terminal_result(&self) -> RunResult {
        if self.aborted {
            RunResult::failed("run reached the 'abort' sentinel")
        } else if self.done_count > 0 {
            RunResult::succeeded()
        } else {
            RunResult::failed("no branch reached 'done'")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use cloche_dsl::parse_and_validate;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use tokio::sync::mpsc::UnboundedReceiver;

    /// A scripted executor: each step name maps to a queue of results it
    /// returns on successive invocations (last entry repeats once exhausted).
    struct ScriptedExecutor {
        scripts: Mutex<std::collections::HashMap<String, VecDeque<String>>>,
    }

    impl ScriptedExecutor {
        fn new(scripts: &[(&str, &[&str])]) -> Self {
            let map = scripts
                .iter()
                .map(|(name, results)| {
                    (
                        name.to_string(),
                        results.iter().map(|r| r.to_string()).collect(),
                    )
                })
                .collect();
            Self { scripts: Mutex::new(map) }
        }
    }

    #[async_trait]
    impl StepExecutor for ScriptedExecutor {
        async fn execute(
            &self,
            step: &cloche_common::workflow::Step,
        ) -> Result<String, StepExecutionError> {
            let mut scripts = self.scripts.lock().unwrap();
            let queue = scripts
                .get_mut(&step.name)
                .unwrap_or_else(|| panic!("no script for step '{}'", step.name));
            let result = if queue.len() > 1 {
                queue.pop_front().unwrap()
            } else {
                queue.front().cloned().unwrap()
            };
            Ok(result)
        }
    }

    fn drain_events(mut rx: UnboundedReceiver<EngineEvent>) -> Vec<EngineEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn linear_success_reaches_done() {
        let wf = parse_and_validate(
            r#"
            workflow "demo" {
                step build { run = "echo ok" results = [success, fail] }
                build:success -> done
                build:fail -> abort
            }
        "#,
        )
        .unwrap();
        let executor = Arc::new(ScriptedExecutor::new(&[("build", &["success"])]));
        let (tx, rx) = mpsc::unbounded_channel();
        let result = run(Arc::new(wf), executor, tx, CancellationToken::new()).await;
        assert_eq!(result.state, RunState::Succeeded);

        let events = drain_events(rx);
        assert!(matches!(events[0], EngineEvent::StepLaunched { .. }));
        assert!(events
            .iter()
            .any(|e| matches!(e, EngineEvent::StepCompleted { result, .. } if result == "success")));
        assert!(matches!(events.last(), Some(EngineEvent::RunTerminal { state: RunState::Succeeded, .. })));
    }

    #[tokio::test]
    async fn abort_branch_fails_regardless_of_other_results() {
        let wf = parse_and_validate(
            r#"
            workflow "demo" {
                step build { run = "echo" results = [success, fail] }
                build:success -> done
                build:fail -> abort
            }
        "#,
        )
        .unwrap();
        let executor = Arc::new(ScriptedExecutor::new(&[("build", &["fail"])]));
        let (tx, _rx) = mpsc::unbounded_channel();
        let result = run(Arc::new(wf), executor, tx, CancellationToken::new()).await;
        assert_eq!(result.state, RunState::Failed);
    }

    #[tokio::test]
    async fn retry_loop_runs_check_three_times() {
        let wf = parse_and_validate(
            r#"
            workflow "demo" {
                step code { prompt = "write code" results = [success, fail] }
                step check { run = "cargo test" results = [pass, fail] }
                code:success -> check
                code:fail -> abort
                check:pass -> done
                check:fail -> code
            }
        "#,
        )
        .unwrap();
        let executor = Arc::new(ScriptedExecutor::new(&[
            ("code", &["success", "success", "success"]),
            ("check", &["fail", "fail", "pass"]),
        ]));
        let (tx, rx) = mpsc::unbounded_channel();
        let result = run(Arc::new(wf), executor, tx, CancellationToken::new()).await;
        assert_eq!(result.state, RunState::Succeeded);

        let events = drain_events(rx);
        let code_completions = events
            .iter()
            .filter(|e| matches!(e, EngineEvent::StepCompleted { step_name, .. } if step_name == "code"))
            .count();
        let check_completions = events
            .iter()
            .filter(|e| matches!(e, EngineEvent::StepCompleted { step_name, .. } if step_name == "check"))
            .count();
        assert_eq!(code_completions, 3);
        assert_eq!(check_completions, 3);
    }

    #[tokio::test]
    async fn fan_out_collect_all_fires_once() {
        let wf = parse_and_validate(
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
        let executor = Arc::new(ScriptedExecutor::new(&[
            ("code", &["success"]),
            ("test", &["pass"]),
            ("lint", &["pass"]),
            ("merge", &["ok"]),
        ]));
        let (tx, rx) = mpsc::unbounded_channel();
        let result = run(Arc::new(wf), executor, tx, CancellationToken::new()).await;
        assert_eq!(result.state, RunState::Succeeded);

        let events = drain_events(rx);
        let merge_launches = events
            .iter()
            .filter(|e| matches!(e, EngineEvent::StepLaunched { step_name } if step_name == "merge"))
            .count();
        assert_eq!(merge_launches, 1);
        let collect_fires = events
            .iter()
            .filter(|e| matches!(e, EngineEvent::CollectFired { .. }))
            .count();
        assert_eq!(collect_fires, 1);
    }

    #[tokio::test]
    async fn undeclared_result_fails_the_run() {
        let wf = parse_and_validate(
            r#"
            workflow "demo" {
                step build { run = "echo" results = [success, fail] }
                build:success -> done
                build:fail -> abort
            }
        "#,
        )
        .unwrap();
        let executor = Arc::new(ScriptedExecutor::new(&[("build", &["maybe"])]));
        let (tx, _rx) = mpsc::unbounded_channel();
        let result = run(Arc::new(wf), executor, tx, CancellationToken::new()).await;
        assert_eq!(result.state, RunState::Failed);
        assert!(result.error.unwrap().contains("undeclared result"));
    }

    #[tokio::test]
    async fn cancellation_during_a_run_yields_cancelled() {
        struct NeverReturns;
        #[async_trait]
        impl StepExecutor for NeverReturns {
            async fn execute(
                &self,
                _step: &cloche_common::workflow::Step,
            ) -> Result<String, StepExecutionError> {
                std::future::pending::<()>().await;
                unreachable!()
            }
        }

        let wf = parse_and_validate(
            r#"
            workflow "demo" {
                step build { run = "echo" results = [success] }
                build:success -> done
            }
        "#,
        )
        .unwrap();
        let cancel = CancellationToken::new();
        let cancel_clone = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            cancel_clone.cancel();
        });

        let (tx, _rx) = mpsc::unbounded_channel();
        let result = run(Arc::new(wf), Arc::new(NeverReturns), tx, cancel).await;
        assert_eq!(result.state, RunState::Cancelled);
    }

    #[tokio::test]
    async fn step_limit_exceeded_fails_an_unbounded_loop() {
        let wf = parse_and_validate(
            r#"
            workflow "demo" {
                step spin { run = "echo" results = [again] }
                spin:again -> spin
            }
        "#,
        )
        .unwrap();
        let executor = Arc::new(ScriptedExecutor::new(&[("spin", &["again"])]));
        let (tx, _rx) = mpsc::unbounded_channel();
        let result = run_with_step_limit(Arc::new(wf), executor, tx, CancellationToken::new(), 5).await;
        assert_eq!(result.state, RunState::Failed);
        assert!(result.error.unwrap().contains("step-launch limit"));
    }
}
