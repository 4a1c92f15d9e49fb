//! Tear stacks down in the reverse of build order.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, Level};

use super::Context;
use crate::core::errors::Result;
use crate::plan::{Plan, PlanOutcome, PlanReport, Status, StepAction};
use crate::provider::{Provider, StackState};
use crate::stack::Stack;

const DESTROYING: &str = "submitted for destruction";

struct DestroyStack {
    stack: Arc<Stack>,
    provider: Arc<dyn Provider>,
    submitted: AtomicBool,
}

#[async_trait]
impl StepAction for DestroyStack {
    async fn advance(&self, status: &Status) -> anyhow::Result<Status> {
        if !self.stack.enabled {
            return Ok(Status::skipped("disabled"));
        }

        let fqn = &self.stack.fqn;
        let described = self.provider.describe_stack(fqn).await?;

        if self.submitted.load(Ordering::SeqCst) {
            return Ok(match described {
                None => Status::complete("stack destroyed"),
                Some(s) if s.state.is_deleted() => Status::complete("stack destroyed"),
                Some(s) if s.state == StackState::DeleteFailed => Status::failed(s.state.to_string()),
                Some(_) => Status::submitted(DESTROYING),
            });
        }

        match described {
            None => Ok(Status::skipped("does not exist in cloudformation")),
            Some(s) if s.state.is_deleted() => Ok(Status::skipped("does not exist in cloudformation")),
            Some(s) if s.state == StackState::DeleteInProgress => {
                self.submitted.store(true, Ordering::SeqCst);
                Ok(Status::submitted(DESTROYING))
            }
            Some(s) if s.state.is_in_progress() => {
                debug!(stack = %fqn, state = %s.state, "waiting for running operation");
                Ok(status.clone())
            }
            Some(_) => {
                self.provider.destroy_stack(fqn).await?;
                self.submitted.store(true, Ordering::SeqCst);
                Ok(Status::submitted(DESTROYING))
            }
        }
    }
}

/// Delete stacks, dependents before the stacks they depend on.
pub struct DestroyAction {
    ctx: Arc<Context>,
}

impl DestroyAction {
    pub fn new(ctx: Arc<Context>) -> Self {
        Self { ctx }
    }

    /// The build graph reversed: a stack that required another is destroyed
    /// before it.
    pub fn plan<S: AsRef<str>>(&self, targets: Option<&[S]>) -> Result<Plan> {
        self.ctx.stack_plan("Destroy stacks", targets, true, |stack| {
            Arc::new(DestroyStack {
                stack: stack.clone(),
                provider: self.ctx.provider.clone(),
                submitted: AtomicBool::new(false),
            }) as Arc<dyn StepAction>
        })
    }

    pub async fn execute<S: AsRef<str>>(
        &self,
        targets: Option<&[S]>,
        cancel: &CancellationToken,
    ) -> Result<PlanReport> {
        let plan = self.plan(targets)?;
        plan.outline(Level::DEBUG, "")?;
        let report = plan.execute(&self.ctx.execution.walker(), cancel).await?;
        info!(outcome = %report.outcome, "destroy finished");
        Ok(report)
    }

    pub async fn run<S: AsRef<str>>(
        &self,
        targets: Option<&[S]>,
        cancel: &CancellationToken,
    ) -> Result<PlanOutcome> {
        Ok(self.execute(targets, cancel).await?.outcome)
    }
}
