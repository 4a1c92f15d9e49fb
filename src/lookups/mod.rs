//! `${type argument}` interpolation in stack variables.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::core::errors::{Result, StackerError};
use crate::provider::Provider;

pub mod env;
pub mod output;
pub mod parse;

pub use env::EnvLookup;
pub use output::OutputLookup;
pub use parse::{extract_output_dependencies, tokenize, Token};

/// What a lookup handler may consult while resolving.
#[derive(Clone)]
pub struct LookupContext {
    pub provider: Arc<dyn Provider>,
    /// Stack name to fully qualified name, for every stack in the config.
    pub fqns: HashMap<String, String>,
}

impl LookupContext {
    pub fn new(provider: Arc<dyn Provider>, fqns: HashMap<String, String>) -> Self {
        Self { provider, fqns }
    }

    /// Names outside the config are taken to be fully qualified already.
    pub fn fqn_for(&self, stack: &str) -> String {
        self.fqns
            .get(stack)
            .cloned()
            .unwrap_or_else(|| stack.to_string())
    }
}

#[async_trait]
pub trait Lookup: Send + Sync {
    /// The type keyword, as written after `${`.
    fn name(&self) -> &str;

    async fn handle(&self, argument: &str, ctx: &LookupContext) -> Result<String>;
}

/// Lookup handlers keyed by type.
#[derive(Clone)]
pub struct LookupRegistry {
    handlers: Arc<RwLock<HashMap<String, Arc<dyn Lookup>>>>,
}

impl LookupRegistry {
    pub fn new() -> Self {
        Self {
            handlers: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// A registry with `env` and `output`.
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        {
            let mut handlers = registry.handlers.write();
            handlers.insert("env".to_string(), Arc::new(EnvLookup) as Arc<dyn Lookup>);
            handlers.insert("output".to_string(), Arc::new(OutputLookup) as Arc<dyn Lookup>);
        }
        registry
    }

    pub fn register(&self, lookup: Arc<dyn Lookup>) -> Result<()> {
        let mut handlers = self.handlers.write();
        let name = lookup.name().to_string();
        if handlers.contains_key(&name) {
            return Err(StackerError::lookup(name, "a handler is already registered"));
        }
        handlers.insert(name, lookup);
        Ok(())
    }

    pub fn unregister(&self, name: &str) -> Option<Arc<dyn Lookup>> {
        self.handlers.write().remove(name)
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Lookup>> {
        self.handlers.read().get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.read().contains_key(name)
    }

    pub fn list(&self) -> Vec<String> {
        self.handlers.read().keys().cloned().collect()
    }

    /// Replace every lookup in `value` with its result.
    pub async fn resolve(&self, value: &str, ctx: &LookupContext) -> Result<String> {
        let mut resolved = String::with_capacity(value.len());
        for token in tokenize(value)? {
            match token {
                Token::Literal(text) => resolved.push_str(&text),
                Token::Lookup {
                    lookup_type,
                    argument,
                } => {
                    let handler = self.get(&lookup_type).ok_or_else(|| {
                        StackerError::lookup(&lookup_type, "unknown lookup type")
                    })?;
                    resolved.push_str(&handler.handle(&argument, ctx).await?);
                }
            }
        }
        Ok(resolved)
    }

    pub async fn resolve_all(
        &self,
        variables: &BTreeMap<String, String>,
        ctx: &LookupContext,
    ) -> Result<BTreeMap<String, String>> {
        let mut resolved = BTreeMap::new();
        for (key, value) in variables {
            resolved.insert(key.clone(), self.resolve(value, ctx).await?);
        }
        Ok(resolved)
    }
}

impl Default for LookupRegistry {
    fn default() -> Self {
        Self::new()
    }
}
