use thiserror::Error;

use crate::dag::DagError;

/// Unified error type for the entire stackplan library
#[derive(Debug, Error)]
pub enum StackerError {
    /// Structural graph errors (duplicate node, missing node, cycle)
    #[error(transparent)]
    Dag(#[from] DagError),

    /// A step declared a dependency the graph could not accept
    #[error("Invalid dependency '{dependency}' declared by '{dependent}': {source}")]
    InvalidDependency {
        dependent: String,
        dependency: String,
        #[source]
        source: DagError,
    },

    /// A requested target does not name any planned step
    #[error("Target not found: {target}")]
    TargetNotFound { target: String },

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Configuration {
        message: String,
        field: Option<String>,
    },

    /// Variable lookup errors
    #[error("Lookup '{lookup_type}' failed: {message}")]
    Lookup {
        lookup_type: String,
        message: String,
    },

    /// Blueprint registration and rendering errors
    #[error("Blueprint '{blueprint}' error: {message}")]
    Blueprint { blueprint: String, message: String },

    /// Errors surfaced by the stack provider
    #[error("Provider operation {operation} failed for {stack}: {message}")]
    Provider {
        operation: String,
        stack: String,
        message: String,
    },

    /// IO errors
    #[error("IO operation failed: {operation}")]
    Io {
        operation: String,
        #[source]
        source: std::io::Error,
    },

    /// Serialization errors
    #[error("Serialization failed: {format}")]
    Serialization {
        format: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Generic internal errors
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl StackerError {
    /// Wrap a graph error raised while connecting `dependent` to `dependency`
    pub fn invalid_dependency<D: Into<String>, P: Into<String>>(
        dependent: D,
        dependency: P,
        source: DagError,
    ) -> Self {
        Self::InvalidDependency {
            dependent: dependent.into(),
            dependency: dependency.into(),
            source,
        }
    }

    /// Create a target-not-found error
    pub fn target_not_found<S: Into<String>>(target: S) -> Self {
        Self::TargetNotFound {
            target: target.into(),
        }
    }

    /// Create a configuration error
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
            field: None,
        }
    }

    /// Create a configuration error pointing at a specific field
    pub fn configuration_field<S: Into<String>, F: Into<String>>(message: S, field: F) -> Self {
        Self::Configuration {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Create a lookup error
    pub fn lookup<T: Into<String>, M: Into<String>>(lookup_type: T, message: M) -> Self {
        Self::Lookup {
            lookup_type: lookup_type.into(),
            message: message.into(),
        }
    }

    /// Create a blueprint error
    pub fn blueprint<B: Into<String>, M: Into<String>>(blueprint: B, message: M) -> Self {
        Self::Blueprint {
            blueprint: blueprint.into(),
            message: message.into(),
        }
    }

    /// Create a provider error
    pub fn provider<O: Into<String>, S: Into<String>, M: Into<String>>(
        operation: O,
        stack: S,
        message: M,
    ) -> Self {
        Self::Provider {
            operation: operation.into(),
            stack: stack.into(),
            message: message.into(),
        }
    }

    /// Create an IO error
    pub fn io<S: Into<String>>(operation: S, source: std::io::Error) -> Self {
        Self::Io {
            operation: operation.into(),
            source,
        }
    }

    /// Create a serialization error
    pub fn serialization<S: Into<String>, E: std::error::Error + Send + Sync + 'static>(
        format: S,
        source: E,
    ) -> Self {
        Self::Serialization {
            format: format.into(),
            source: Box::new(source),
        }
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Check if error is recoverable by resubmitting the same work
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Provider { .. } | Self::Io { .. } => true,
            Self::Lookup { .. } => true, // outputs may appear on a later poll
            Self::Dag(_)
            | Self::InvalidDependency { .. }
            | Self::TargetNotFound { .. }
            | Self::Configuration { .. } => false,
            _ => false,
        }
    }

    /// Get error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            Self::Dag(_) => "dag",
            Self::InvalidDependency { .. } => "dependency",
            Self::TargetNotFound { .. } => "target",
            Self::Configuration { .. } => "configuration",
            Self::Lookup { .. } => "lookup",
            Self::Blueprint { .. } => "blueprint",
            Self::Provider { .. } => "provider",
            Self::Io { .. } => "io",
            Self::Serialization { .. } => "serialization",
            Self::Internal { .. } => "internal",
        }
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, StackerError>;

/// Convert from common error types
impl From<std::io::Error> for StackerError {
    fn from(err: std::io::Error) -> Self {
        Self::io("io_operation", err)
    }
}

impl From<serde_json::Error> for StackerError {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization("json", err)
    }
}

impl From<serde_yaml::Error> for StackerError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::serialization("yaml", err)
    }
}
