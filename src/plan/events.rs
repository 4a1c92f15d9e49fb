//! Event system for plan execution
//!
//! Provides typed event emission for step status changes. Sinks are called
//! from every worker, so implementations must be cheap and must not panic.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

use super::status::Status;
use super::step::StepSnapshot;

/// Runtime event types
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum RuntimeEvent {
    PlanStarted {
        description: String,
        steps: Vec<String>,
    },
    StepStatusChanged {
        step: String,
        status: Status,
        last_updated: DateTime<Utc>,
    },
    PlanFinished {
        outcome: String,
        duration_ms: u64,
    },
}

/// Event envelope with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeEventEnvelope {
    pub version: u32,
    pub sequence: u64,
    pub run_id: String,
    pub timestamp: DateTime<Utc>,
    pub event: RuntimeEvent,
}

/// Event sink trait for emitting events
pub trait EventSink: Send + Sync {
    /// Emit an event
    fn emit(&self, envelope: &RuntimeEventEnvelope);
}

/// Stamps events for one plan run with a run id and a sequence number.
pub struct EventEmitter {
    run_id: String,
    sequence: AtomicU64,
    sink: Arc<dyn EventSink>,
}

impl EventEmitter {
    pub fn new(run_id: impl Into<String>, sink: Arc<dyn EventSink>) -> Self {
        Self {
            run_id: run_id.into(),
            sequence: AtomicU64::new(0),
            sink,
        }
    }

    pub fn emit(&self, event: RuntimeEvent) {
        let envelope = RuntimeEventEnvelope {
            version: 1,
            sequence: self.sequence.fetch_add(1, Ordering::SeqCst),
            run_id: self.run_id.clone(),
            timestamp: Utc::now(),
            event,
        };
        self.sink.emit(&envelope);
    }
}

/// A simple logging event sink
pub struct LoggingEventSink;

impl EventSink for LoggingEventSink {
    fn emit(&self, envelope: &RuntimeEventEnvelope) {
        match &envelope.event {
            RuntimeEvent::StepStatusChanged { step, status, .. } => {
                tracing::info!(run_id = %envelope.run_id, step = %step, "{}", status);
            }
            other => tracing::debug!(run_id = %envelope.run_id, "Event: {:?}", other),
        }
    }
}

/// A buffering event sink that collects events
pub struct BufferingEventSink {
    events: Arc<RwLock<Vec<RuntimeEventEnvelope>>>,
}

impl BufferingEventSink {
    pub fn new() -> Self {
        Self {
            events: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub fn get_events(&self) -> Vec<RuntimeEventEnvelope> {
        self.events.read().clone()
    }

    /// Status changes recorded for `step`, in emission order.
    pub fn statuses_for(&self, step: &str) -> Vec<Status> {
        self.events
            .read()
            .iter()
            .filter_map(|e| match &e.event {
                RuntimeEvent::StepStatusChanged {
                    step: name, status, ..
                } if name == step => Some(status.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        self.events.write().clear();
    }
}

impl Default for BufferingEventSink {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink for BufferingEventSink {
    fn emit(&self, envelope: &RuntimeEventEnvelope) {
        self.events.write().push(envelope.clone());
    }
}

/// Keeps the latest status of every step, for rendering a live view.
pub struct CheckpointSink {
    latest: Mutex<HashMap<String, StepSnapshot>>,
}

impl CheckpointSink {
    pub fn new() -> Self {
        Self {
            latest: Mutex::new(HashMap::new()),
        }
    }

    /// Snapshot of every step seen so far, sorted by name.
    pub fn snapshot(&self) -> Vec<StepSnapshot> {
        let mut steps: Vec<StepSnapshot> = self.latest.lock().values().cloned().collect();
        steps.sort_by(|a, b| a.name.cmp(&b.name));
        steps
    }
}

impl Default for CheckpointSink {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink for CheckpointSink {
    fn emit(&self, envelope: &RuntimeEventEnvelope) {
        if let RuntimeEvent::StepStatusChanged {
            step,
            status,
            last_updated,
        } = &envelope.event
        {
            self.latest.lock().insert(
                step.clone(),
                StepSnapshot {
                    name: step.clone(),
                    status: status.clone(),
                    last_updated: *last_updated,
                },
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emitter_sequences_events() {
        let sink = Arc::new(BufferingEventSink::new());
        let emitter = EventEmitter::new("run-1", sink.clone());
        for status in [Status::submitted("creating new stack"), Status::complete("done")] {
            emitter.emit(RuntimeEvent::StepStatusChanged {
                step: "dev-vpc".to_string(),
                status,
                last_updated: Utc::now(),
            });
        }

        let events = sink.get_events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].sequence, 0);
        assert_eq!(events[1].sequence, 1);
        assert_eq!(events[1].run_id, "run-1");
        assert_eq!(
            sink.statuses_for("dev-vpc"),
            vec![Status::submitted("creating new stack"), Status::complete("done")]
        );
    }

    #[test]
    fn test_checkpoint_keeps_latest() {
        let sink = Arc::new(CheckpointSink::new());
        let emitter = EventEmitter::new("run-2", sink.clone());
        emitter.emit(RuntimeEvent::StepStatusChanged {
            step: "dev-db".to_string(),
            status: Status::submitted("creating new stack"),
            last_updated: Utc::now(),
        });
        emitter.emit(RuntimeEvent::StepStatusChanged {
            step: "dev-db".to_string(),
            status: Status::failed("rolling back new stack"),
            last_updated: Utc::now(),
        });

        let snapshot = sink.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].status, Status::failed("rolling back new stack"));
    }
}
