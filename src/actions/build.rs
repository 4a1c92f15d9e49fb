//! Create or update every stack, dependencies first.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, Level};

use super::Context;
use crate::blueprint::RenderedTemplate;
use crate::core::errors::Result;
use crate::plan::{Plan, PlanOutcome, PlanReport, Status, StepAction};
use crate::provider::{ProviderStack, StackRequest, StackState, UpdateOutcome};
use crate::stack::Stack;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Submission {
    Create,
    Update,
}

impl Submission {
    fn reason(self) -> &'static str {
        match self {
            Submission::Create => "creating new stack",
            Submission::Update => "updating existing stack",
        }
    }

    fn rollback_reason(self) -> &'static str {
        match self {
            Submission::Create => "rolling back new stack",
            Submission::Update => "rolling back update",
        }
    }
}

/// Drives one stack to a created or updated state.
struct BuildStack {
    stack: Arc<Stack>,
    ctx: Arc<Context>,
    submission: Mutex<Option<Submission>>,
}

impl BuildStack {
    fn new(stack: Arc<Stack>, ctx: Arc<Context>) -> Self {
        Self {
            stack,
            ctx,
            submission: Mutex::new(None),
        }
    }

    async fn render(&self) -> Result<RenderedTemplate> {
        let lookup_ctx = self.ctx.lookup_context();
        self.stack
            .resolve(&self.ctx.lookups, &self.ctx.blueprints, &lookup_ctx)
            .await
    }

    fn request(&self, template: RenderedTemplate) -> StackRequest {
        StackRequest {
            fqn: self.stack.fqn.clone(),
            template,
            tags: self.stack.tags.clone(),
        }
    }

    /// First pass: decide between create, update or leaving the stack be.
    async fn submit(&self, status: &Status, existing: Option<ProviderStack>) -> Result<Status> {
        let Some(existing) = existing else {
            let template = self.render().await?;
            self.ctx.provider.create_stack(&self.request(template)).await?;
            *self.submission.lock() = Some(Submission::Create);
            return Ok(Status::submitted(Submission::Create.reason()));
        };

        if self.stack.is_update_blocked() {
            return Ok(Status::skipped("locked"));
        }
        if existing.state == StackState::RollbackComplete {
            return Ok(Status::failed("stack is in ROLLBACK_COMPLETE state"));
        }
        if existing.state.is_in_progress() {
            debug!(stack = %self.stack.fqn, state = %existing.state, "waiting for running operation");
            return Ok(status.clone());
        }

        let template = self.render().await?;
        match self.ctx.provider.update_stack(&self.request(template)).await? {
            UpdateOutcome::NoChange => Ok(Status::skipped("nochange")),
            UpdateOutcome::Submitted => {
                *self.submission.lock() = Some(Submission::Update);
                Ok(Status::submitted(Submission::Update.reason()))
            }
        }
    }

    fn check(&self, submission: Submission, described: Option<ProviderStack>) -> Status {
        match described {
            None => Status::failed("stack disappeared after submission"),
            Some(s) if s.state.is_rollback() => Status::failed(submission.rollback_reason()),
            Some(s) if s.state.is_failed() => Status::failed(s.state.to_string()),
            Some(s) if s.state.is_complete() => Status::complete(submission.reason()),
            Some(s) => Status::submitted(s.state.to_string()),
        }
    }
}

#[async_trait]
impl StepAction for BuildStack {
    async fn advance(&self, status: &Status) -> anyhow::Result<Status> {
        if !self.stack.enabled {
            return Ok(Status::skipped("disabled"));
        }

        let described = self.ctx.provider.describe_stack(&self.stack.fqn).await?;
        let submission = *self.submission.lock();
        let next = match submission {
            Some(submission) => self.check(submission, described),
            None => self.submit(status, described).await?,
        };
        Ok(next)
    }
}

/// Create missing stacks and update existing ones.
pub struct BuildAction {
    ctx: Arc<Context>,
}

impl BuildAction {
    pub fn new(ctx: Arc<Context>) -> Self {
        Self { ctx }
    }

    pub fn plan<S: AsRef<str>>(&self, targets: Option<&[S]>) -> Result<Plan> {
        self.ctx
            .stack_plan("Create/Update stacks", targets, false, |stack| {
                Arc::new(BuildStack::new(stack.clone(), self.ctx.clone())) as Arc<dyn StepAction>
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
        info!(outcome = %report.outcome, "build finished");
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
