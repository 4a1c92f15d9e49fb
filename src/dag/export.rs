//! Graph export for tooling outside the engine (graph printing, dashboards).

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use petgraph::dot::{Config, Dot};
use petgraph::graph::{DiGraph, NodeIndex};
use serde_json::{json, Map, Value};

use super::dag::{Dag, NodeId};

/// Supported export formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphFormat {
    Dot,
    Json,
}

impl FromStr for GraphFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "dot" => Ok(GraphFormat::Dot),
            "json" => Ok(GraphFormat::Json),
            other => Err(format!(
                "invalid graph format: {other} (expected \"dot\" or \"json\")"
            )),
        }
    }
}

impl fmt::Display for GraphFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GraphFormat::Dot => write!(f, "dot"),
            GraphFormat::Json => write!(f, "json"),
        }
    }
}

impl<N: NodeId> Dag<N> {
    /// Copy the graph into a petgraph `DiGraph`, edges pointing from a node to
    /// each of its dependencies.
    pub fn to_petgraph(&self) -> DiGraph<String, String> {
        let mut graph = DiGraph::new();
        let mut indices: HashMap<&N, NodeIndex> = HashMap::new();
        for node in self.nodes() {
            indices.insert(node, graph.add_node(node.to_string()));
        }
        for (node, deps) in self.to_dependencies() {
            for dep in deps {
                graph.add_edge(indices[&node], indices[&dep], String::new());
            }
        }
        graph
    }

    pub fn to_dot(&self) -> String {
        let graph = self.to_petgraph();
        format!("{}", Dot::with_config(&graph, &[Config::EdgeNoLabel]))
    }

    /// `{"node": ["dependency", ...], ...}`
    pub fn to_json(&self) -> Value {
        let mut map = Map::new();
        for (node, deps) in self.to_dependencies() {
            let deps: Vec<String> = deps.iter().map(|d| d.to_string()).collect();
            map.insert(node.to_string(), json!(deps));
        }
        Value::Object(map)
    }

    /// Render in `format`, optionally dropping redundant edges first.
    pub fn render(&self, format: GraphFormat, reduce: bool) -> Result<String, serde_json::Error> {
        let reduced;
        let dag = if reduce {
            reduced = self.transitive_reduction();
            &reduced
        } else {
            self
        };
        match format {
            GraphFormat::Dot => Ok(dag.to_dot()),
            GraphFormat::Json => serde_json::to_string_pretty(&dag.to_json()),
        }
    }
}
