// Core infrastructure modules
pub mod core {
    pub mod errors;
    pub mod logging;
}

// Dependency graph and the plan engine built on it
pub mod dag;
pub mod plan;

// Stack model and the collaborators steps talk to
pub mod actions;
pub mod blueprint;
pub mod config;
pub mod lookups;
pub mod provider;
pub mod stack;

// Re-exports for convenience
pub use actions::{BuildAction, Context, DestroyAction, GraphAction};
pub use config::{ExecutionConfig, StackDefinition, StackerConfig};
pub use core::errors::{Result, StackerError};
pub use core::logging::init_logging;
pub use dag::{Dag, DagError, GraphFormat, WalkReport, Walker};
pub use plan::{
    build_plan, BufferingEventSink, CheckpointSink, EventSink, LoggingEventSink, Plan, PlanOutcome,
    PlanReport, PollPolicy, Status, Step, StepAction,
};
pub use provider::{MemoryProvider, Provider, StackState};
pub use stack::Stack;
