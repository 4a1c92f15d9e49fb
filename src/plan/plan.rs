use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn, Level};
use uuid::Uuid;

use super::events::{EventEmitter, EventSink, RuntimeEvent};
use super::graph::Graph;
use super::status::Status;
use super::step::{PollPolicy, Step, StepSnapshot};
use crate::core::errors::{Result, StackerError};
use crate::dag::{WalkReport, Walker};

/// Terminal result of executing a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanOutcome {
    /// Every step is complete or skipped.
    Success,
    /// At least one step failed or never ran because a dependency failed.
    Failed,
    /// Cancellation was requested before the plan finished and no step
    /// failed on its own.
    Interrupted,
}

impl fmt::Display for PlanOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlanOutcome::Success => write!(f, "success"),
            PlanOutcome::Failed => write!(f, "failed"),
            PlanOutcome::Interrupted => write!(f, "interrupted"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PlanReport {
    pub outcome: PlanOutcome,
    /// Final state of every step, in execution order.
    pub steps: Vec<StepSnapshot>,
    pub walk: WalkReport<String>,
}

impl PlanReport {
    pub fn is_success(&self) -> bool {
        self.outcome == PlanOutcome::Success
    }

    pub fn status_of(&self, step: &str) -> Option<&Status> {
        self.steps.iter().find(|s| s.name == step).map(|s| &s.status)
    }
}

/// A graph of steps ready to be outlined or executed once.
pub struct Plan {
    id: Uuid,
    description: String,
    graph: Graph,
    poll: PollPolicy,
    emitter: Option<Arc<EventEmitter>>,
    executed: AtomicBool,
}

impl fmt::Debug for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Plan")
            .field("id", &self.id)
            .field("description", &self.description)
            .field("graph", &self.graph)
            .finish()
    }
}

/// Build a plan from steps and their declared requirements.
///
/// With `reverse` the dependency graph is transposed, so a step that required
/// another now runs before it (teardown order). `targets` are short or full
/// step names; the plan is narrowed to those steps and everything they depend
/// on in the (possibly reversed) graph. An unknown target is an error.
pub fn build_plan<S: AsRef<str>>(
    description: impl Into<String>,
    steps: Vec<Arc<Step>>,
    targets: Option<&[S]>,
    reverse: bool,
) -> Result<Plan> {
    let mut graph = Graph::from_steps(steps)?;

    if reverse {
        graph = graph.transposed();
    }

    if let Some(targets) = targets {
        let names = resolve_targets(&graph, targets)?;
        graph = graph.filtered(&names)?;
    }

    Ok(Plan::new(description, graph))
}

fn resolve_targets<S: AsRef<str>>(graph: &Graph, targets: &[S]) -> Result<Vec<String>> {
    let steps = graph.steps();
    let mut names = Vec::with_capacity(targets.len());
    for target in targets {
        let target = target.as_ref();
        let matches: Vec<String> = steps
            .iter()
            .filter(|s| s.short_name() == target || s.name() == target)
            .map(|s| s.name().to_string())
            .collect();
        if matches.is_empty() {
            return Err(StackerError::target_not_found(target));
        }
        names.extend(matches);
    }
    Ok(names)
}

impl Plan {
    pub fn new(description: impl Into<String>, graph: Graph) -> Self {
        Self {
            id: Uuid::new_v4(),
            description: description.into(),
            graph,
            poll: PollPolicy::default(),
            emitter: None,
            executed: AtomicBool::new(false),
        }
    }

    pub fn with_poll_policy(mut self, poll: PollPolicy) -> Self {
        self.poll = poll;
        self
    }

    /// Report every status change of every step to `sink`.
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        let emitter = Arc::new(EventEmitter::new(self.id.to_string(), sink));
        for step in self.graph.steps() {
            step.attach_emitter(emitter.clone());
        }
        self.emitter = Some(emitter);
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn steps(&self) -> Vec<Arc<Step>> {
        self.graph.steps()
    }

    pub fn keys(&self) -> Vec<String> {
        self.graph.dag().nodes().cloned().collect()
    }

    /// Step names in the order they become runnable: dependencies first.
    pub fn execution_order(&self) -> Result<Vec<String>> {
        let mut order = self.graph.dag().topological_sort()?;
        order.reverse();
        Ok(order)
    }

    /// Log the planned order at `level` without running anything.
    pub fn outline(&self, level: Level, message: &str) -> Result<Vec<String>> {
        let order = self.execution_order()?;
        log_at(level, &format!("Plan \"{}\":", self.description));
        for (i, name) in order.iter().enumerate() {
            log_at(level, &format!("  - step: {}: target: \"{}\"", i + 1, name));
        }
        if !message.is_empty() {
            log_at(level, message);
        }
        Ok(order)
    }

    /// Current state of every step, in execution order.
    pub fn snapshot(&self) -> Vec<StepSnapshot> {
        let order = self.execution_order().unwrap_or_else(|_| self.keys());
        order
            .iter()
            .filter_map(|name| self.graph.get(name))
            .map(|step| step.snapshot())
            .collect()
    }

    /// Run every step with `walker` until the plan settles or `cancel` fires.
    ///
    /// A plan can only be executed once.
    pub async fn execute(&self, walker: &Walker, cancel: &CancellationToken) -> Result<PlanReport> {
        if self.executed.swap(true, Ordering::SeqCst) {
            return Err(StackerError::internal(format!(
                "plan {} has already been executed",
                self.id
            )));
        }

        let started = Instant::now();
        info!(
            plan = %self.id,
            description = %self.description,
            steps = self.graph.len(),
            limit = ?walker.limit(),
            "executing plan"
        );
        self.emit(RuntimeEvent::PlanStarted {
            description: self.description.clone(),
            steps: self.keys(),
        });

        let poll = self.poll.clone();
        let report = self
            .graph
            .walk(walker, |step| {
                let walker = walker.clone();
                let cancel = cancel.clone();
                let poll = poll.clone();
                async move { step.run(&walker, &cancel, &poll).await }
            })
            .await;

        // A worker that panicked outside the advance call never got to record it.
        for name in &report.failed {
            if let Some(step) = self.graph.get(name) {
                if !step.done() {
                    step.set_status(Status::failed("step worker aborted"));
                }
            }
        }

        let failures: HashSet<&String> = report
            .failed
            .iter()
            .filter(|name| {
                self.graph
                    .get(name.as_str())
                    .is_some_and(|step| !step.status().is_cancelled())
            })
            .collect();
        for name in &report.blocked {
            let Some(step) = self.graph.get(name) else {
                continue;
            };
            let behind_failure = self
                .graph
                .dag()
                .all_downstreams(name)
                .map(|deps| deps.iter().any(|d| failures.contains(d)))
                .unwrap_or(false);
            if behind_failure || !cancel.is_cancelled() {
                step.set_status(Status::failed("dependency has failed"));
            } else {
                step.set_status(Status::cancelled("interrupted"));
            }
        }

        // A real failure outranks an interruption in the same run.
        let steps = self.snapshot();
        let outcome = if steps.iter().any(|s| s.status.is_failed()) {
            PlanOutcome::Failed
        } else if steps.iter().any(|s| s.status.is_cancelled()) {
            PlanOutcome::Interrupted
        } else {
            PlanOutcome::Success
        };

        let duration_ms = started.elapsed().as_millis() as u64;
        match outcome {
            PlanOutcome::Success => info!(plan = %self.id, duration_ms, "plan completed"),
            PlanOutcome::Interrupted => warn!(plan = %self.id, duration_ms, "plan interrupted"),
            PlanOutcome::Failed => {
                for s in steps.iter().filter(|s| !s.status.is_ok()) {
                    error!(plan = %self.id, step = %s.name, status = %s.status, "step did not succeed");
                }
            }
        }
        self.emit(RuntimeEvent::PlanFinished {
            outcome: outcome.to_string(),
            duration_ms,
        });

        Ok(PlanReport {
            outcome,
            steps,
            walk: report,
        })
    }

    fn emit(&self, event: RuntimeEvent) {
        if let Some(emitter) = &self.emitter {
            emitter.emit(event);
        }
    }
}

fn log_at(level: Level, message: &str) {
    match level {
        Level::ERROR => error!("{}", message),
        Level::WARN => warn!("{}", message),
        Level::INFO => info!("{}", message),
        Level::DEBUG => debug!("{}", message),
        _ => trace!("{}", message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::time::Duration;

    fn recording_step(name: &str, requires: &[&str], log: &Arc<Mutex<Vec<String>>>) -> Arc<Step> {
        let log = log.clone();
        let me = name.to_string();
        Arc::new(
            Step::from_fn(name, move |_| {
                log.lock().push(me.clone());
                Ok(Status::complete("done"))
            })
            .with_requires(requires.iter().copied()),
        )
    }

    #[tokio::test]
    async fn test_chain_runs_in_dependency_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let steps = vec![
            recording_step("a", &["b"], &log),
            recording_step("b", &["c"], &log),
            recording_step("c", &[], &log),
        ];
        let plan = build_plan::<&str>("chain", steps, None, false)
            .unwrap()
            .with_poll_policy(PollPolicy::fixed(Duration::from_millis(1)));

        assert_eq!(plan.execution_order().unwrap(), vec!["c", "b", "a"]);
        let report = plan
            .execute(&Walker::unbounded(), &CancellationToken::new())
            .await
            .unwrap();

        assert!(report.is_success());
        assert_eq!(*log.lock(), vec!["c", "b", "a"]);
    }

    #[tokio::test]
    async fn test_plan_executes_once() {
        let plan = build_plan::<&str>(
            "once",
            vec![Arc::new(Step::from_fn("a", |_| Ok(Status::complete("done"))))],
            None,
            false,
        )
        .unwrap();
        let cancel = CancellationToken::new();
        assert!(plan.execute(&Walker::unbounded(), &cancel).await.is_ok());
        assert!(plan.execute(&Walker::unbounded(), &cancel).await.is_err());
    }

    #[test]
    fn test_unknown_target_fails_fast() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let err = build_plan(
            "targets",
            vec![recording_step("a", &[], &log)],
            Some(&["missing"][..]),
            false,
        )
        .unwrap_err();
        assert!(matches!(err, StackerError::TargetNotFound { ref target } if target == "missing"));
    }

    #[test]
    fn test_outline_does_not_run_steps() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let plan = build_plan::<&str>(
            "outline",
            vec![
                recording_step("vpc", &[], &log),
                recording_step("db", &["vpc"], &log),
            ],
            None,
            false,
        )
        .unwrap();

        let order = plan.outline(Level::INFO, "dry run only").unwrap();
        assert_eq!(order, vec!["vpc", "db"]);
        assert!(log.lock().is_empty());
        assert!(plan.steps().iter().all(|s| s.status() == Status::Pending));
    }
}
