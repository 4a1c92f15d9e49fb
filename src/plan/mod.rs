pub mod events;
pub mod graph;
pub mod plan;
pub mod status;
pub mod step;

pub use events::{
    BufferingEventSink, CheckpointSink, EventEmitter, EventSink, LoggingEventSink, RuntimeEvent,
    RuntimeEventEnvelope,
};
pub use graph::Graph;
pub use plan::{build_plan, Plan, PlanOutcome, PlanReport};
pub use status::Status;
pub use step::{FnAction, PollPolicy, Step, StepAction, StepSnapshot};
