//! In-memory provider used by tests and the demo.
//!
//! Submitted operations stay in progress for a configurable number of
//! `describe_stack` calls before settling, so steps really have to poll.

use std::collections::{BTreeMap, HashSet, VecDeque};

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{Provider, ProviderStack, StackRequest, StackState, UpdateOutcome};
use crate::core::errors::{Result, StackerError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Describe,
    Create,
    Update,
    Destroy,
    GetOutputs,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderCall {
    pub operation: Operation,
    pub fqn: String,
}

#[derive(Debug)]
struct Record {
    stack: ProviderStack,
    /// States still to be reported, one per describe call.
    transitions: VecDeque<StackState>,
}

#[derive(Debug)]
pub struct MemoryProvider {
    stacks: DashMap<String, Record>,
    outputs: DashMap<String, BTreeMap<String, String>>,
    failures: DashMap<String, HashSet<Operation>>,
    ticks: usize,
    calls: Mutex<Vec<ProviderCall>>,
}

impl Default for MemoryProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryProvider {
    pub fn new() -> Self {
        Self {
            stacks: DashMap::new(),
            outputs: DashMap::new(),
            failures: DashMap::new(),
            ticks: 1,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Number of describe calls an operation takes to settle (at least 1).
    pub fn with_ticks(mut self, ticks: usize) -> Self {
        self.ticks = ticks.max(1);
        self
    }

    /// Outputs reported for `fqn` once a create or update completes.
    pub fn with_outputs<I, K, V>(self, fqn: &str, outputs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let outputs: BTreeMap<String, String> = outputs
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        if let Some(mut record) = self.stacks.get_mut(fqn) {
            record.stack.outputs = outputs.clone();
        }
        self.outputs.insert(fqn.to_string(), outputs);
        self
    }

    /// Make the next `operation` on `fqn` end badly: creates and updates
    /// roll back, destroys end in `DELETE_FAILED`.
    pub fn fail(&self, fqn: &str, operation: Operation) {
        self.failures
            .entry(fqn.to_string())
            .or_default()
            .insert(operation);
    }

    /// Seed a stack that already exists.
    pub fn insert_stack(&self, stack: ProviderStack) {
        self.stacks.insert(
            stack.fqn.clone(),
            Record {
                stack,
                transitions: VecDeque::new(),
            },
        );
    }

    /// Current state without advancing or logging.
    pub fn state_of(&self, fqn: &str) -> Option<StackState> {
        self.stacks.get(fqn).map(|r| r.stack.state)
    }

    pub fn contains(&self, fqn: &str) -> bool {
        self.stacks.contains_key(fqn)
    }

    pub fn calls(&self) -> Vec<ProviderCall> {
        self.calls.lock().clone()
    }

    /// Stacks `operation` was called for, in call order.
    pub fn calls_for(&self, operation: Operation) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.operation == operation)
            .map(|c| c.fqn.clone())
            .collect()
    }

    fn record(&self, operation: Operation, fqn: &str) {
        debug!(operation = ?operation, stack = %fqn, "provider call");
        self.calls.lock().push(ProviderCall {
            operation,
            fqn: fqn.to_string(),
        });
    }

    fn take_failure(&self, fqn: &str, operation: Operation) -> bool {
        self.failures
            .get_mut(fqn)
            .map(|mut ops| ops.remove(&operation))
            .unwrap_or(false)
    }

    /// `in_progress` for all but the last tick, then `settled`.
    fn schedule(&self, in_progress: StackState, settled: &[StackState]) -> VecDeque<StackState> {
        let mut transitions: VecDeque<StackState> =
            std::iter::repeat(in_progress).take(self.ticks - 1).collect();
        transitions.extend(settled.iter().copied());
        transitions
    }
}

#[async_trait]
impl Provider for MemoryProvider {
    async fn describe_stack(&self, fqn: &str) -> Result<Option<ProviderStack>> {
        self.record(Operation::Describe, fqn);
        let snapshot = {
            let Some(mut record) = self.stacks.get_mut(fqn) else {
                return Ok(None);
            };
            if let Some(next) = record.transitions.pop_front() {
                record.stack.state = next;
                if next.is_complete() {
                    if let Some(outputs) = self.outputs.get(fqn) {
                        record.stack.outputs = outputs.clone();
                    }
                }
            }
            record.stack.clone()
        };

        if snapshot.state.is_deleted() {
            self.stacks.remove(fqn);
            return Ok(None);
        }
        Ok(Some(snapshot))
    }

    async fn create_stack(&self, request: &StackRequest) -> Result<()> {
        self.record(Operation::Create, &request.fqn);
        if self.stacks.contains_key(&request.fqn) {
            return Err(StackerError::provider(
                "create",
                &request.fqn,
                "stack already exists",
            ));
        }

        let transitions = if self.take_failure(&request.fqn, Operation::Create) {
            self.schedule(
                StackState::CreateInProgress,
                &[StackState::RollbackInProgress, StackState::RollbackComplete],
            )
        } else {
            self.schedule(StackState::CreateInProgress, &[StackState::CreateComplete])
        };

        self.stacks.insert(
            request.fqn.clone(),
            Record {
                stack: ProviderStack {
                    fqn: request.fqn.clone(),
                    state: StackState::CreateInProgress,
                    template_hash: Some(request.template.hash().to_string()),
                    outputs: BTreeMap::new(),
                },
                transitions,
            },
        );
        Ok(())
    }

    async fn update_stack(&self, request: &StackRequest) -> Result<UpdateOutcome> {
        self.record(Operation::Update, &request.fqn);
        let fail = self.take_failure(&request.fqn, Operation::Update);
        let transitions = if fail {
            self.schedule(
                StackState::UpdateInProgress,
                &[
                    StackState::UpdateRollbackInProgress,
                    StackState::UpdateRollbackComplete,
                ],
            )
        } else {
            self.schedule(StackState::UpdateInProgress, &[StackState::UpdateComplete])
        };

        let mut record = self.stacks.get_mut(&request.fqn).ok_or_else(|| {
            StackerError::provider("update", &request.fqn, "stack does not exist")
        })?;
        if record.stack.state.is_in_progress() {
            return Err(StackerError::provider(
                "update",
                &request.fqn,
                format!("stack is busy ({})", record.stack.state),
            ));
        }
        if record.stack.template_hash.as_deref() == Some(request.template.hash()) {
            return Ok(UpdateOutcome::NoChange);
        }

        record.stack.state = StackState::UpdateInProgress;
        record.stack.template_hash = Some(request.template.hash().to_string());
        record.transitions = transitions;
        Ok(UpdateOutcome::Submitted)
    }

    async fn destroy_stack(&self, fqn: &str) -> Result<()> {
        self.record(Operation::Destroy, fqn);
        let settled = if self.take_failure(fqn, Operation::Destroy) {
            StackState::DeleteFailed
        } else {
            StackState::DeleteComplete
        };
        let transitions = self.schedule(StackState::DeleteInProgress, &[settled]);

        let mut record = self
            .stacks
            .get_mut(fqn)
            .ok_or_else(|| StackerError::provider("destroy", fqn, "stack does not exist"))?;
        record.stack.state = StackState::DeleteInProgress;
        record.transitions = transitions;
        Ok(())
    }

    async fn get_outputs(&self, fqn: &str) -> Result<BTreeMap<String, String>> {
        self.record(Operation::GetOutputs, fqn);
        self.stacks
            .get(fqn)
            .map(|r| r.stack.outputs.clone())
            .ok_or_else(|| StackerError::provider("get_outputs", fqn, "stack does not exist"))
    }
}
