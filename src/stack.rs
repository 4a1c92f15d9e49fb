use std::collections::BTreeMap;

use serde::Serialize;

use crate::blueprint::{BlueprintInput, BlueprintRegistry, RenderedTemplate};
use crate::config::StackDefinition;
use crate::core::errors::Result;
use crate::lookups::{extract_output_dependencies, LookupContext, LookupRegistry};

/// Join a namespace and a stack name. An empty namespace leaves the name as is.
pub fn fully_qualified_name(namespace: &str, delimiter: &str, name: &str) -> String {
    if namespace.is_empty() {
        name.to_string()
    } else {
        format!("{namespace}{delimiter}{name}")
    }
}

/// A stack definition bound to a namespace.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Stack {
    pub name: String,
    /// Name of the stack at the provider; also its step identity.
    pub fqn: String,
    pub blueprint: String,
    pub template_body: Option<String>,
    /// Names of the stacks this one needs: declared ones plus those its
    /// variables read outputs from.
    pub requires: Vec<String>,
    pub variables: BTreeMap<String, String>,
    pub tags: BTreeMap<String, String>,
    pub enabled: bool,
    pub locked: bool,
    /// Update even when locked.
    pub force: bool,
}

impl Stack {
    pub fn new(definition: &StackDefinition, namespace: &str, delimiter: &str) -> Result<Self> {
        let provider_name = definition
            .stack_name
            .as_deref()
            .unwrap_or(&definition.name);

        let mut requires = definition.requires.clone();
        for value in definition.variables.values() {
            for stack in extract_output_dependencies(value)? {
                if stack != definition.name && !requires.contains(&stack) {
                    requires.push(stack);
                }
            }
        }
        requires.retain(|r| r != &definition.name);

        Ok(Self {
            name: definition.name.clone(),
            fqn: fully_qualified_name(namespace, delimiter, provider_name),
            blueprint: definition.blueprint.clone(),
            template_body: definition.template_body.clone(),
            requires,
            variables: definition.variables.clone(),
            tags: definition.tags.clone(),
            enabled: definition.enabled,
            locked: definition.locked,
            force: false,
        })
    }

    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    /// Locked stacks are left alone unless forced.
    pub fn is_update_blocked(&self) -> bool {
        self.locked && !self.force
    }

    /// Resolve every variable, then render the blueprint with the results.
    pub async fn resolve(
        &self,
        lookups: &LookupRegistry,
        blueprints: &BlueprintRegistry,
        ctx: &LookupContext,
    ) -> Result<RenderedTemplate> {
        let variables = lookups.resolve_all(&self.variables, ctx).await?;
        blueprints.render(
            &self.blueprint,
            &BlueprintInput {
                stack_name: &self.name,
                template_body: self.template_body.as_deref(),
                variables: &variables,
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn definition() -> StackDefinition {
        let mut def = StackDefinition::new("db");
        def.requires = vec!["vpc".to_string()];
        def.variables.insert("Vpc".to_string(), "${output vpc::VpcId}".to_string());
        def.variables.insert(
            "Subnet".to_string(),
            "${output network::SubnetId}".to_string(),
        );
        def.variables.insert("Me".to_string(), "${output db::Endpoint}".to_string());
        def
    }

    #[test]
    fn test_requires_include_output_references() {
        let stack = Stack::new(&definition(), "dev", "-").unwrap();
        assert_eq!(stack.fqn, "dev-db");
        assert_eq!(stack.requires, vec!["vpc".to_string(), "network".to_string()]);
    }

    #[test]
    fn test_fqn_uses_stack_name_override() {
        let mut def = StackDefinition::new("vpc");
        def.stack_name = Some("core-network".to_string());
        assert_eq!(Stack::new(&def, "prod", ".").unwrap().fqn, "prod.core-network");
        assert_eq!(fully_qualified_name("", "-", "vpc"), "vpc");
    }

    #[test]
    fn test_locked_unless_forced() {
        let mut def = StackDefinition::new("vpc");
        def.locked = true;
        let stack = Stack::new(&def, "dev", "-").unwrap();
        assert!(stack.is_update_blocked());
        assert!(!stack.with_force(true).is_update_blocked());
    }
}
