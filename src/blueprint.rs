//! Template rendering, looked up by name from the stack definition.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::core::errors::{Result, StackerError};

/// A rendered template body and its content hash (blake3, hex).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderedTemplate {
    body: String,
    hash: String,
}

impl RenderedTemplate {
    pub fn new<S: Into<String>>(body: S) -> Self {
        let body = body.into();
        let hash = blake3::hash(body.as_bytes()).to_hex().to_string();
        Self { body, hash }
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn hash(&self) -> &str {
        &self.hash
    }
}

/// Everything a blueprint needs to render one stack. Variables are already
/// resolved.
#[derive(Debug, Clone, Copy)]
pub struct BlueprintInput<'a> {
    pub stack_name: &'a str,
    pub template_body: Option<&'a str>,
    pub variables: &'a BTreeMap<String, String>,
}

pub trait Blueprint: Send + Sync {
    fn name(&self) -> &str;

    fn render(&self, input: &BlueprintInput<'_>) -> Result<RenderedTemplate>;
}

/// Substitutes `{{Var}}` placeholders in the stack's `template_body`.
#[derive(Debug, Clone, Copy, Default)]
pub struct InlineBlueprint;

impl InlineBlueprint {
    pub const NAME: &'static str = "inline";

    fn error(&self, input: &BlueprintInput<'_>, message: String) -> StackerError {
        StackerError::blueprint(Self::NAME, format!("{}: {}", input.stack_name, message))
    }
}

impl Blueprint for InlineBlueprint {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn render(&self, input: &BlueprintInput<'_>) -> Result<RenderedTemplate> {
        let template = input
            .template_body
            .ok_or_else(|| self.error(input, "template_body is required".to_string()))?;

        let mut body = String::with_capacity(template.len());
        let mut rest = template;
        while let Some(start) = rest.find("{{") {
            body.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            let end = after
                .find("}}")
                .ok_or_else(|| self.error(input, "unterminated '{{' placeholder".to_string()))?;
            let key = after[..end].trim();
            let value = input
                .variables
                .get(key)
                .ok_or_else(|| self.error(input, format!("unknown variable '{key}'")))?;
            body.push_str(value);
            rest = &after[end + 2..];
        }
        body.push_str(rest);

        Ok(RenderedTemplate::new(body))
    }
}

/// Blueprints keyed by the name used in stack definitions.
#[derive(Clone)]
pub struct BlueprintRegistry {
    blueprints: Arc<RwLock<HashMap<String, Arc<dyn Blueprint>>>>,
}

impl BlueprintRegistry {
    pub fn new() -> Self {
        Self {
            blueprints: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// A registry holding the `inline` blueprint.
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        registry
            .blueprints
            .write()
            .insert(InlineBlueprint::NAME.to_string(), Arc::new(InlineBlueprint));
        registry
    }

    pub fn register(&self, blueprint: Arc<dyn Blueprint>) -> Result<()> {
        let mut blueprints = self.blueprints.write();
        let name = blueprint.name().to_string();
        if blueprints.contains_key(&name) {
            return Err(StackerError::blueprint(name, "already registered"));
        }
        blueprints.insert(name, blueprint);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Blueprint>> {
        self.blueprints.read().get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.blueprints.read().contains_key(name)
    }

    pub fn list(&self) -> Vec<String> {
        self.blueprints.read().keys().cloned().collect()
    }

    /// Look up `name` and render with it.
    pub fn render(&self, name: &str, input: &BlueprintInput<'_>) -> Result<RenderedTemplate> {
        let blueprint = self
            .get(name)
            .ok_or_else(|| StackerError::blueprint(name, "no blueprint registered under this name"))?;
        blueprint.render(input)
    }
}

impl Default for BlueprintRegistry {
    fn default() -> Self {
        Self::new()
    }
}
