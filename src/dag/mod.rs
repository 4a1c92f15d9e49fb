//! Generic dependency graph and the walk primitive the plan executes on.
//!
//! - [`dag`] holds the graph and its algorithms (sort, filter, reduction).
//! - [`walker`] contains the walking policies and [`Dag::walk`].
//! - [`export`] renders a graph as DOT or JSON.

pub mod dag;
pub mod export;
pub mod walker;

pub use dag::{Dag, DagError, NodeId};
pub use export::GraphFormat;
pub use walker::{Slot, WalkReport, Walker};
