use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::future::Future;
use std::sync::Arc;

use tracing::debug;

use super::step::Step;
use crate::core::errors::{Result, StackerError};
use crate::dag::{Dag, WalkReport, Walker};

/// Steps bound to the nodes of a [`Dag`], keyed by step name.
///
/// Every step has exactly one node and every node has exactly one step.
#[derive(Debug, Clone, Default)]
pub struct Graph {
    steps: HashMap<String, Arc<Step>>,
    dag: Dag<String>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add every step, then connect each one to its declared requirements.
    pub fn from_steps<I>(steps: I) -> Result<Self>
    where
        I: IntoIterator<Item = Arc<Step>>,
    {
        let steps: Vec<Arc<Step>> = steps.into_iter().collect();
        let mut graph = Self::new();
        for step in &steps {
            graph.add_step(step.clone())?;
        }
        for step in &steps {
            for dependency in step.requires() {
                graph.connect(step.name(), dependency)?;
            }
        }
        Ok(graph)
    }

    pub fn add_step(&mut self, step: Arc<Step>) -> Result<()> {
        self.dag.add_node(step.name().to_string())?;
        self.steps.insert(step.name().to_string(), step);
        Ok(())
    }

    pub fn add_step_if_not_exists(&mut self, step: Arc<Step>) {
        if !self.steps.contains_key(step.name()) {
            self.dag.add_node_if_not_exists(step.name().to_string());
            self.steps.insert(step.name().to_string(), step);
        }
    }

    /// Make `step` depend on `dependency`. Both must already be in the graph.
    pub fn connect(&mut self, step: &str, dependency: &str) -> Result<()> {
        debug!(step = %step, dependency = %dependency, "connecting steps");
        self.dag
            .add_edge(&step.to_string(), &dependency.to_string())
            .map_err(|e| StackerError::invalid_dependency(step, dependency, e))
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&Arc<Step>> {
        self.steps.get(name)
    }

    /// Steps in insertion order.
    pub fn steps(&self) -> Vec<Arc<Step>> {
        self.dag
            .nodes()
            .filter_map(|n| self.steps.get(n).cloned())
            .collect()
    }

    pub fn dag(&self) -> &Dag<String> {
        &self.dag
    }

    /// Dependents first, dependencies last.
    pub fn topological_sort(&self) -> Result<Vec<Arc<Step>>> {
        Ok(self
            .dag
            .topological_sort()?
            .iter()
            .filter_map(|n| self.steps.get(n).cloned())
            .collect())
    }

    /// Direct dependencies of `name`.
    pub fn downstream(&self, name: &str) -> Result<Vec<Arc<Step>>> {
        Ok(self
            .dag
            .downstream(&name.to_string())?
            .iter()
            .filter_map(|n| self.steps.get(n).cloned())
            .collect())
    }

    /// Same steps, every dependency reversed. Used for teardown.
    pub fn transposed(&self) -> Self {
        Self {
            steps: self.steps.clone(),
            dag: self.dag.transpose(),
        }
    }

    /// Only `names` and their transitive dependencies.
    pub fn filtered<S: AsRef<str>>(&self, names: &[S]) -> Result<Self> {
        let names: Vec<String> = names.iter().map(|n| n.as_ref().to_string()).collect();
        let dag = self.dag.filter(names.iter())?;
        let steps = dag
            .nodes()
            .filter_map(|n| self.steps.get(n).map(|s| (n.clone(), s.clone())))
            .collect();
        Ok(Self { steps, dag })
    }

    /// Walk the underlying graph, handing each ready node's step to `visit`.
    pub async fn walk<F, Fut>(&self, walker: &Walker, visit: F) -> WalkReport<String>
    where
        F: Fn(Arc<Step>) -> Fut,
        Fut: Future<Output = bool> + Send + 'static,
    {
        let steps = self.steps.clone();
        self.dag
            .walk(walker, move |name| {
                let step = steps.get(&name).cloned();
                let fut = step.map(&visit);
                async move {
                    match fut {
                        Some(fut) => fut.await,
                        None => false,
                    }
                }
            })
            .await
    }

    /// `{step: {dependencies}}`, sorted for stable comparison and printing.
    pub fn to_dict(&self) -> BTreeMap<String, BTreeSet<String>> {
        self.dag
            .to_dependencies()
            .into_iter()
            .map(|(node, deps)| (node, deps.into_iter().collect()))
            .collect()
    }
}
