//! Directed acyclic graph storage and algorithms.
//!
//! Edges point from a node to the nodes it *depends on*: `add_edge("db", "vpc")`
//! means `db` requires `vpc`. With that orientation the topological sort yields
//! dependents first, so execution order is the reverse of
//! [`Dag::topological_sort`].

use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::hash::Hash;

use thiserror::Error;

/// Bounds every node identity must satisfy. Blanket-implemented, so any
/// `String`-like handle works.
pub trait NodeId: Clone + Eq + Hash + fmt::Debug + fmt::Display + Send + Sync + 'static {}

impl<T> NodeId for T where T: Clone + Eq + Hash + fmt::Debug + fmt::Display + Send + Sync + 'static {}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DagError {
    #[error("Node already exists: {0}")]
    DuplicateNode(String),

    #[error("Node not found: {0}")]
    NodeNotFound(String),

    #[error("Edge not found: {from} -> {to}")]
    EdgeNotFound { from: String, to: String },

    #[error("Cycle detected: {0}")]
    Cycle(String),

    #[error("Invalid graph: {0}")]
    Validation(String),
}

/// A graph of node identities and the identities each one depends on.
///
/// Node insertion order is preserved and drives every iteration, which keeps
/// sorting and walking deterministic for a given construction sequence.
#[derive(Debug, Clone)]
pub struct Dag<N: NodeId> {
    order: Vec<N>,
    graph: HashMap<N, Vec<N>>,
}

impl<N: NodeId> Default for Dag<N> {
    fn default() -> Self {
        Self::new()
    }
}

/// Structural equality: same node set and same edge set, regardless of the
/// order nodes or edges were inserted in.
impl<N: NodeId> PartialEq for Dag<N> {
    fn eq(&self, other: &Self) -> bool {
        if self.graph.len() != other.graph.len() {
            return false;
        }
        self.graph.iter().all(|(node, deps)| match other.graph.get(node) {
            Some(other_deps) => {
                deps.len() == other_deps.len() && deps.iter().all(|d| other_deps.contains(d))
            }
            None => false,
        })
    }
}

impl<N: NodeId> Eq for Dag<N> {}

impl<N: NodeId> Dag<N> {
    pub fn new() -> Self {
        Self {
            order: Vec::new(),
            graph: HashMap::new(),
        }
    }

    /// Build a graph from `(node, dependencies)` pairs. Every node must appear
    /// as a key; dependencies may reference keys that appear later.
    pub fn from_dependencies<I, D>(entries: I) -> Result<Self, DagError>
    where
        I: IntoIterator<Item = (N, D)>,
        D: IntoIterator<Item = N>,
    {
        let entries: Vec<(N, Vec<N>)> = entries
            .into_iter()
            .map(|(node, deps)| (node, deps.into_iter().collect()))
            .collect();

        let mut dag = Self::new();
        for (node, _) in &entries {
            dag.add_node(node.clone())?;
        }
        for (node, deps) in &entries {
            for dep in deps {
                dag.add_edge(node, dep)?;
            }
        }
        Ok(dag)
    }

    pub fn size(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn contains(&self, node: &N) -> bool {
        self.graph.contains_key(node)
    }

    /// Nodes in insertion order.
    pub fn nodes(&self) -> impl Iterator<Item = &N> {
        self.order.iter()
    }

    /// Node → dependencies, in node insertion order.
    pub fn to_dependencies(&self) -> Vec<(N, Vec<N>)> {
        self.order
            .iter()
            .map(|n| (n.clone(), self.graph[n].clone()))
            .collect()
    }

    pub fn add_node(&mut self, node: N) -> Result<(), DagError> {
        if self.graph.contains_key(&node) {
            return Err(DagError::DuplicateNode(node.to_string()));
        }
        self.graph.insert(node.clone(), Vec::new());
        self.order.push(node);
        Ok(())
    }

    pub fn add_node_if_not_exists(&mut self, node: N) {
        if !self.graph.contains_key(&node) {
            self.graph.insert(node.clone(), Vec::new());
            self.order.push(node);
        }
    }

    /// Remove a node and every edge that points at it.
    pub fn delete_node(&mut self, node: &N) -> Result<(), DagError> {
        if self.graph.remove(node).is_none() {
            return Err(DagError::NodeNotFound(node.to_string()));
        }
        self.order.retain(|n| n != node);
        for deps in self.graph.values_mut() {
            deps.retain(|d| d != node);
        }
        Ok(())
    }

    pub fn delete_node_if_exists(&mut self, node: &N) {
        let _ = self.delete_node(node);
    }

    /// Record that `from` depends on `to`.
    ///
    /// The edge is applied to a copy first and the copy is sorted; a cycle is
    /// reported without touching `self`. Re-adding an existing edge is a no-op.
    pub fn add_edge(&mut self, from: &N, to: &N) -> Result<(), DagError> {
        for node in [from, to] {
            if !self.graph.contains_key(node) {
                return Err(DagError::NodeNotFound(node.to_string()));
            }
        }
        if self.graph[from].contains(to) {
            return Ok(());
        }

        let mut candidate = self.clone();
        if let Some(deps) = candidate.graph.get_mut(from) {
            deps.push(to.clone());
        }
        candidate.topological_sort()?;

        *self = candidate;
        Ok(())
    }

    pub fn delete_edge(&mut self, from: &N, to: &N) -> Result<(), DagError> {
        let missing = || DagError::EdgeNotFound {
            from: from.to_string(),
            to: to.to_string(),
        };
        let deps = self.graph.get_mut(from).ok_or_else(missing)?;
        let before = deps.len();
        deps.retain(|d| d != to);
        if deps.len() == before {
            return Err(missing());
        }
        Ok(())
    }

    /// A new graph with every edge reversed.
    pub fn transpose(&self) -> Self {
        let mut transposed = Self {
            order: self.order.clone(),
            graph: self.order.iter().map(|n| (n.clone(), Vec::new())).collect(),
        };
        for node in &self.order {
            for dep in &self.graph[node] {
                if let Some(deps) = transposed.graph.get_mut(dep) {
                    deps.push(node.clone());
                }
            }
        }
        transposed
    }

    /// Kahn's algorithm. Dependents come before their dependencies; ties are
    /// broken FIFO in node insertion order.
    pub fn topological_sort(&self) -> Result<Vec<N>, DagError> {
        let mut in_degree: HashMap<&N, usize> = self.order.iter().map(|n| (n, 0)).collect();
        for node in &self.order {
            for dep in &self.graph[node] {
                if let Some(degree) = in_degree.get_mut(dep) {
                    *degree += 1;
                }
            }
        }

        let mut queue: VecDeque<&N> = self.order.iter().filter(|n| in_degree[n] == 0).collect();
        let mut sorted = Vec::with_capacity(self.order.len());

        while let Some(node) = queue.pop_front() {
            sorted.push(node.clone());
            for dep in &self.graph[node] {
                if let Some(degree) = in_degree.get_mut(dep) {
                    *degree -= 1;
                    if *degree == 0 {
                        queue.push_back(dep);
                    }
                }
            }
        }

        if sorted.len() != self.order.len() {
            let unresolved: Vec<String> = self
                .order
                .iter()
                .filter(|n| in_degree[n] > 0)
                .map(|n| n.to_string())
                .collect();
            return Err(DagError::Cycle(format!(
                "graph is not acyclic; unresolved nodes: {}",
                unresolved.join(", ")
            )));
        }
        Ok(sorted)
    }

    /// Nodes no other node depends on.
    pub fn independent_nodes(&self) -> Vec<N> {
        let depended_on: HashSet<&N> = self.graph.values().flatten().collect();
        self.order
            .iter()
            .filter(|n| !depended_on.contains(n))
            .cloned()
            .collect()
    }

    pub fn validate(&self) -> Result<(), DagError> {
        if self.independent_nodes().is_empty() {
            return Err(DagError::Validation(
                "no independent nodes detected".to_string(),
            ));
        }
        self.topological_sort().map(|_| ()).map_err(|e| match e {
            DagError::Cycle(msg) => DagError::Validation(msg),
            other => other,
        })
    }

    /// Direct dependencies of `node`.
    pub fn downstream(&self, node: &N) -> Result<Vec<N>, DagError> {
        self.graph
            .get(node)
            .cloned()
            .ok_or_else(|| DagError::NodeNotFound(node.to_string()))
    }

    /// Every node reachable from `node` through dependency edges, in
    /// topological order.
    pub fn all_downstreams(&self, node: &N) -> Result<Vec<N>, DagError> {
        let seen = self.reachable_from(node)?;
        Ok(self
            .topological_sort()?
            .into_iter()
            .filter(|n| seen.contains(n))
            .collect())
    }

    /// Nodes that list `node` as a direct dependency.
    pub fn predecessors(&self, node: &N) -> Result<Vec<N>, DagError> {
        if !self.graph.contains_key(node) {
            return Err(DagError::NodeNotFound(node.to_string()));
        }
        Ok(self
            .order
            .iter()
            .filter(|n| self.graph[*n].contains(node))
            .cloned()
            .collect())
    }

    /// Every node that depends on `node`, directly or transitively, nearest
    /// dependents first (topological order of the transposed graph).
    pub fn all_upstreams(&self, node: &N) -> Result<Vec<N>, DagError> {
        self.transpose().all_downstreams(node)
    }

    /// A new graph holding `nodes` plus all of their transitive dependencies,
    /// keeping the original edges among the retained set.
    pub fn filter<'a, I>(&self, nodes: I) -> Result<Self, DagError>
    where
        I: IntoIterator<Item = &'a N>,
    {
        let mut retained: HashSet<N> = HashSet::new();
        for node in nodes {
            retained.extend(self.reachable_from(node)?);
            retained.insert(node.clone());
        }

        let mut filtered = Self::new();
        for node in self.order.iter().filter(|n| retained.contains(*n)) {
            let deps = self.graph[node]
                .iter()
                .filter(|d| retained.contains(*d))
                .cloned()
                .collect();
            filtered.graph.insert(node.clone(), deps);
            filtered.order.push(node.clone());
        }
        Ok(filtered)
    }

    /// Nodes without dependencies.
    pub fn all_leaves(&self) -> Vec<N> {
        self.order
            .iter()
            .filter(|n| self.graph[*n].is_empty())
            .cloned()
            .collect()
    }

    /// Drop every edge `a -> c` whose target is still reachable through another
    /// direct dependency of `a`. Reachability is unchanged. Intended for
    /// rendering only.
    pub fn transitive_reduction(&self) -> Self {
        let closures: HashMap<&N, HashSet<N>> = self
            .order
            .iter()
            .map(|n| (n, self.reachable_from(n).unwrap_or_default()))
            .collect();

        let mut reduced = self.clone();
        for node in &self.order {
            let deps = &self.graph[node];
            let redundant: Vec<&N> = deps
                .iter()
                .filter(|target| {
                    deps.iter()
                        .any(|other| other != *target && closures[other].contains(*target))
                })
                .collect();
            if let Some(kept) = reduced.graph.get_mut(node) {
                kept.retain(|d| !redundant.contains(&d));
            }
        }
        reduced
    }

    /// `true` if `to` is reachable from `from` by following dependency edges.
    pub fn has_path(&self, from: &N, to: &N) -> Result<bool, DagError> {
        Ok(self.reachable_from(from)?.contains(to))
    }

    /// Breadth-first set of nodes reachable from `node`, excluding `node`.
    fn reachable_from(&self, node: &N) -> Result<HashSet<N>, DagError> {
        let start = self
            .graph
            .get(node)
            .ok_or_else(|| DagError::NodeNotFound(node.to_string()))?;

        let mut seen: HashSet<N> = HashSet::new();
        let mut queue: VecDeque<&N> = start.iter().collect();
        while let Some(current) = queue.pop_front() {
            if seen.insert(current.clone()) {
                queue.extend(self.graph[current].iter());
            }
        }
        Ok(seen)
    }
}
