//! YAML configuration: namespace, execution tuning and stack definitions.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::errors::{Result, StackerError};
use crate::dag::Walker;
use crate::plan::PollPolicy;

fn default_delimiter() -> String {
    "-".to_string()
}

fn default_blueprint() -> String {
    "inline".to_string()
}

fn default_true() -> bool {
    true
}

fn default_max_parallel() -> usize {
    10
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_max_poll_interval_ms() -> u64 {
    10_000
}

fn default_backoff_multiplier() -> f64 {
    1.5
}

/// How a plan is walked and how often in-flight stacks are polled.
///
/// Every field is optional so a partial override can be merged over a base.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Maximum steps inside a provider call at once; 0 means unlimited.
    #[serde(default)]
    pub max_parallel: Option<usize>,
    #[serde(default)]
    pub poll_interval_ms: Option<u64>,
    #[serde(default)]
    pub max_poll_interval_ms: Option<u64>,
    #[serde(default)]
    pub backoff_multiplier: Option<f64>,
    #[serde(default)]
    pub jitter: Option<bool>,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            max_parallel: Some(default_max_parallel()),
            poll_interval_ms: Some(default_poll_interval_ms()),
            max_poll_interval_ms: Some(default_max_poll_interval_ms()),
            backoff_multiplier: Some(default_backoff_multiplier()),
            jitter: Some(true),
        }
    }
}

impl ExecutionConfig {
    pub fn max_parallel(&self) -> usize {
        self.max_parallel.unwrap_or_else(default_max_parallel)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.unwrap_or_else(default_poll_interval_ms))
    }

    pub fn max_poll_interval(&self) -> Duration {
        Duration::from_millis(
            self.max_poll_interval_ms
                .unwrap_or_else(default_max_poll_interval_ms),
        )
    }

    pub fn backoff_multiplier(&self) -> f64 {
        self.backoff_multiplier
            .unwrap_or_else(default_backoff_multiplier)
    }

    /// Validates configuration values
    pub fn validate(&self) -> Result<()> {
        if let Some(interval) = self.poll_interval_ms {
            if interval == 0 {
                return Err(StackerError::configuration_field(
                    "poll_interval_ms must be greater than 0",
                    "execution.poll_interval_ms",
                ));
            }
        }

        if self.max_poll_interval() < self.poll_interval() {
            return Err(StackerError::configuration_field(
                "max_poll_interval_ms cannot be lower than poll_interval_ms",
                "execution.max_poll_interval_ms",
            ));
        }

        if let Some(multiplier) = self.backoff_multiplier {
            if !multiplier.is_finite() || multiplier < 1.0 {
                return Err(StackerError::configuration_field(
                    "backoff_multiplier must be a finite number of at least 1.0",
                    "execution.backoff_multiplier",
                ));
            }
        }

        Ok(())
    }

    /// Merges two configurations, with `override_with` taking precedence
    pub fn merge(base: &Self, override_with: &Self) -> Result<Self> {
        let merged = Self {
            max_parallel: override_with.max_parallel.or(base.max_parallel),
            poll_interval_ms: override_with.poll_interval_ms.or(base.poll_interval_ms),
            max_poll_interval_ms: override_with
                .max_poll_interval_ms
                .or(base.max_poll_interval_ms),
            backoff_multiplier: override_with.backoff_multiplier.or(base.backoff_multiplier),
            jitter: override_with.jitter.or(base.jitter),
        };

        merged.validate()?;
        Ok(merged)
    }

    pub fn poll_policy(&self) -> PollPolicy {
        PollPolicy {
            interval: self.poll_interval(),
            max_interval: self.max_poll_interval(),
            multiplier: self.backoff_multiplier(),
            jitter: self.jitter.unwrap_or(true),
        }
    }

    pub fn walker(&self) -> Walker {
        Walker::bounded(self.max_parallel())
    }
}

/// One stack as written in the config file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StackDefinition {
    pub name: String,
    /// Provider-side name, used instead of `name` when building the fqn.
    #[serde(default)]
    pub stack_name: Option<String>,
    #[serde(default = "default_blueprint")]
    pub blueprint: String,
    #[serde(default)]
    pub template_body: Option<String>,
    #[serde(default)]
    pub requires: Vec<String>,
    #[serde(default)]
    pub variables: BTreeMap<String, String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub locked: bool,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

impl StackDefinition {
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self {
            name: name.into(),
            stack_name: None,
            blueprint: default_blueprint(),
            template_body: None,
            requires: Vec::new(),
            variables: BTreeMap::new(),
            enabled: true,
            locked: false,
            tags: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StackerConfig {
    pub namespace: String,
    #[serde(default = "default_delimiter")]
    pub namespace_delimiter: String,
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub stacks: Vec<StackDefinition>,
}

impl StackerConfig {
    /// Read, parse and validate a YAML config file.
    pub fn load_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path)
            .map_err(|e| StackerError::io(format!("read {}", path.display()), e))?;
        debug!(path = %path.display(), "loaded config file");
        Self::from_yaml_str(&yaml)
    }

    /// Parse and validate YAML. Missing execution settings fall back to the
    /// defaults.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let mut config: StackerConfig = serde_yaml::from_str(yaml)?;
        config.execution = ExecutionConfig::merge(&ExecutionConfig::default(), &config.execution)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.namespace.trim().is_empty() {
            return Err(StackerError::configuration_field(
                "namespace must not be empty",
                "namespace",
            ));
        }

        let mut names = HashSet::new();
        for stack in &self.stacks {
            if stack.name.trim().is_empty() {
                return Err(StackerError::configuration_field(
                    "stack name must not be empty",
                    "stacks[].name",
                ));
            }
            if !names.insert(stack.name.as_str()) {
                return Err(StackerError::configuration_field(
                    format!("duplicate stack name '{}'", stack.name),
                    "stacks[].name",
                ));
            }
        }

        for stack in &self.stacks {
            for required in &stack.requires {
                if !names.contains(required.as_str()) {
                    return Err(StackerError::configuration_field(
                        format!("stack '{}' requires unknown stack '{}'", stack.name, required),
                        format!("stacks.{}.requires", stack.name),
                    ));
                }
            }
        }

        self.execution.validate()
    }

    pub fn stack(&self, name: &str) -> Option<&StackDefinition> {
        self.stacks.iter().find(|s| s.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const YAML: &str = r#"
namespace: dev
execution:
  max_parallel: 4
stacks:
  - name: vpc
    template_body: "cidr: {{Cidr}}"
    variables:
      Cidr: 10.0.0.0/16
  - name: db
    requires: [vpc]
    locked: true
    tags:
      team: data
"#;

    #[test]
    fn test_parse_with_defaults() {
        let config = StackerConfig::from_yaml_str(YAML).unwrap();
        assert_eq!(config.namespace_delimiter, "-");
        assert_eq!(config.execution.max_parallel(), 4);
        assert_eq!(config.execution.poll_interval(), Duration::from_millis(1000));
        assert_eq!(config.execution.backoff_multiplier(), 1.5);

        let db = config.stack("db").unwrap();
        assert_eq!(db.blueprint, "inline");
        assert!(db.enabled);
        assert!(db.locked);
        assert_eq!(db.requires, vec!["vpc".to_string()]);
        assert_eq!(db.tags.get("team").map(String::as_str), Some("data"));
    }

    #[test]
    fn test_rejects_unknown_requirement() {
        let err = StackerConfig::from_yaml_str(
            "namespace: dev\nstacks:\n  - name: db\n    requires: [vpc]\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("unknown stack 'vpc'"));
    }

    #[test]
    fn test_rejects_duplicates_and_empty_namespace() {
        let dup = "namespace: dev\nstacks:\n  - name: vpc\n  - name: vpc\n";
        assert!(StackerConfig::from_yaml_str(dup).is_err());
        assert!(StackerConfig::from_yaml_str("namespace: \"\"\n").is_err());
    }

    #[test]
    fn test_merge_prefers_override() {
        let base = ExecutionConfig::default();
        let override_with = ExecutionConfig {
            max_parallel: Some(0),
            poll_interval_ms: None,
            max_poll_interval_ms: None,
            backoff_multiplier: Some(2.0),
            jitter: Some(false),
        };
        let merged = ExecutionConfig::merge(&base, &override_with).unwrap();
        assert_eq!(merged.max_parallel(), 0);
        assert_eq!(merged.poll_interval(), Duration::from_millis(1000));
        assert!(matches!(merged.walker(), Walker::Unbounded));

        let policy = merged.poll_policy();
        assert_eq!(policy.multiplier, 2.0);
        assert!(!policy.jitter);
    }

    #[test]
    fn test_merge_validates_result() {
        let bad = ExecutionConfig {
            max_parallel: None,
            poll_interval_ms: Some(5_000),
            max_poll_interval_ms: Some(100),
            backoff_multiplier: None,
            jitter: None,
        };
        assert!(ExecutionConfig::merge(&ExecutionConfig::default(), &bad).is_err());
    }
}
