use async_trait::async_trait;

use super::parse::split_output_argument;
use super::{Lookup, LookupContext};
use crate::core::errors::{Result, StackerError};

/// `${output stack::OutputName}`: an output of another stack in this config,
/// read from the provider.
#[derive(Debug, Clone, Copy, Default)]
pub struct OutputLookup;

#[async_trait]
impl Lookup for OutputLookup {
    fn name(&self) -> &str {
        "output"
    }

    async fn handle(&self, argument: &str, ctx: &LookupContext) -> Result<String> {
        let (stack, key) = split_output_argument(argument)?;
        let fqn = ctx.fqn_for(stack);
        let outputs = ctx.provider.get_outputs(&fqn).await?;
        outputs.get(key).cloned().ok_or_else(|| {
            StackerError::lookup("output", format!("stack {fqn} has no output '{key}'"))
        })
    }
}
