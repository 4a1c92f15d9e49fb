//! Print the build graph for tooling outside the engine.

use std::sync::Arc;

use super::build::BuildAction;
use super::Context;
use crate::core::errors::Result;
use crate::dag::GraphFormat;
use crate::plan::Plan;

pub struct GraphAction {
    ctx: Arc<Context>,
    format: GraphFormat,
    reduce: bool,
}

impl GraphAction {
    pub fn new(ctx: Arc<Context>) -> Self {
        Self {
            ctx,
            format: GraphFormat::Dot,
            reduce: false,
        }
    }

    pub fn with_format(mut self, format: GraphFormat) -> Self {
        self.format = format;
        self
    }

    /// Drop edges implied by longer paths. Only affects the output.
    pub fn with_reduce(mut self, reduce: bool) -> Self {
        self.reduce = reduce;
        self
    }

    pub fn plan<S: AsRef<str>>(&self, targets: Option<&[S]>) -> Result<Plan> {
        BuildAction::new(self.ctx.clone()).plan(targets)
    }

    /// Render the graph. Nothing is executed.
    pub fn run<S: AsRef<str>>(&self, targets: Option<&[S]>) -> Result<String> {
        let plan = self.plan(targets)?;
        Ok(plan.graph().dag().render(self.format, self.reduce)?)
    }
}
