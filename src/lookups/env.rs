use async_trait::async_trait;

use super::{Lookup, LookupContext};
use crate::core::errors::{Result, StackerError};

/// `${env NAME}` or `${env NAME::fallback}`.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvLookup;

#[async_trait]
impl Lookup for EnvLookup {
    fn name(&self) -> &str {
        "env"
    }

    async fn handle(&self, argument: &str, _ctx: &LookupContext) -> Result<String> {
        let (name, fallback) = match argument.split_once("::") {
            Some((name, fallback)) => (name.trim(), Some(fallback)),
            None => (argument.trim(), None),
        };
        if name.is_empty() {
            return Err(StackerError::lookup("env", "missing variable name"));
        }

        match (std::env::var(name), fallback) {
            (Ok(value), _) => Ok(value),
            (Err(_), Some(fallback)) => Ok(fallback.to_string()),
            (Err(e), None) => Err(StackerError::lookup("env", format!("{name}: {e}"))),
        }
    }
}
