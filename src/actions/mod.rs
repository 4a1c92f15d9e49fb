//! The commands: build, destroy and graph export over a set of stacks.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::debug;

use crate::blueprint::BlueprintRegistry;
use crate::config::{ExecutionConfig, StackerConfig};
use crate::core::errors::Result;
use crate::lookups::{LookupContext, LookupRegistry};
use crate::plan::{build_plan, EventSink, Plan, Step, StepAction};
use crate::provider::Provider;
use crate::stack::{fully_qualified_name, Stack};

pub mod build;
pub mod destroy;
pub mod graph;

pub use build::BuildAction;
pub use destroy::DestroyAction;
pub use graph::GraphAction;

/// Everything an action needs: the stacks, how to run them and what to run
/// them against.
#[derive(Clone)]
pub struct Context {
    pub namespace: String,
    pub delimiter: String,
    pub execution: ExecutionConfig,
    pub lookups: LookupRegistry,
    pub blueprints: BlueprintRegistry,
    pub provider: Arc<dyn Provider>,
    stacks: Vec<Arc<Stack>>,
    event_sink: Option<Arc<dyn EventSink>>,
}

impl Context {
    pub fn new(config: &StackerConfig, provider: Arc<dyn Provider>) -> Result<Self> {
        let stacks = config
            .stacks
            .iter()
            .map(|def| {
                Stack::new(def, &config.namespace, &config.namespace_delimiter).map(Arc::new)
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            namespace: config.namespace.clone(),
            delimiter: config.namespace_delimiter.clone(),
            execution: config.execution.clone(),
            lookups: LookupRegistry::with_builtins(),
            blueprints: BlueprintRegistry::with_builtins(),
            provider,
            stacks,
            event_sink: None,
        })
    }

    /// Update the named stacks even if they are locked.
    pub fn with_force<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let names: HashSet<String> = names.into_iter().map(|n| n.as_ref().to_string()).collect();
        self.stacks = self
            .stacks
            .iter()
            .map(|stack| {
                if names.contains(&stack.name) {
                    Arc::new(stack.as_ref().clone().with_force(true))
                } else {
                    stack.clone()
                }
            })
            .collect();
        self
    }

    pub fn with_lookups(mut self, lookups: LookupRegistry) -> Self {
        self.lookups = lookups;
        self
    }

    pub fn with_blueprints(mut self, blueprints: BlueprintRegistry) -> Self {
        self.blueprints = blueprints;
        self
    }

    pub fn with_execution(mut self, execution: ExecutionConfig) -> Self {
        self.execution = execution;
        self
    }

    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.event_sink = Some(sink);
        self
    }

    pub fn stacks(&self) -> &[Arc<Stack>] {
        &self.stacks
    }

    pub fn get_stack(&self, name: &str) -> Option<&Arc<Stack>> {
        self.stacks.iter().find(|s| s.name == name)
    }

    /// Fully qualified name of `name`, whether or not it is in the config.
    pub fn fqn_for(&self, name: &str) -> String {
        match self.get_stack(name) {
            Some(stack) => stack.fqn.clone(),
            None => fully_qualified_name(&self.namespace, &self.delimiter, name),
        }
    }

    pub fn lookup_context(&self) -> LookupContext {
        let fqns: HashMap<String, String> = self
            .stacks
            .iter()
            .map(|s| (s.name.clone(), s.fqn.clone()))
            .collect();
        LookupContext::new(self.provider.clone(), fqns)
    }

    /// One step per stack, wired by `requires`, wrapped in a plan that
    /// polls with the configured policy.
    pub(crate) fn stack_plan<S, F>(
        &self,
        description: &str,
        targets: Option<&[S]>,
        reverse: bool,
        make_action: F,
    ) -> Result<Plan>
    where
        S: AsRef<str>,
        F: Fn(&Arc<Stack>) -> Arc<dyn StepAction>,
    {
        let steps: Vec<Arc<Step>> = self
            .stacks
            .iter()
            .map(|stack| {
                let requires: Vec<String> = stack.requires.iter().map(|r| self.fqn_for(r)).collect();
                Arc::new(
                    Step::new(stack.fqn.clone(), make_action(stack))
                        .with_short_name(stack.name.clone())
                        .with_requires(requires),
                )
            })
            .collect();
        debug!(description, steps = steps.len(), reverse, "building stack plan");

        let mut plan =
            build_plan(description, steps, targets, reverse)?.with_poll_policy(self.execution.poll_policy());
        if let Some(sink) = &self.event_sink {
            plan = plan.with_event_sink(sink.clone());
        }
        Ok(plan)
    }
}
