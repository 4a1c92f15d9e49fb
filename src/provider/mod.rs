//! The boundary to whatever actually creates and deletes stacks.

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::blueprint::RenderedTemplate;
use crate::core::errors::Result;

pub mod memory;

pub use memory::{MemoryProvider, Operation, ProviderCall};

/// Provider-side lifecycle states of a stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StackState {
    CreateInProgress,
    CreateFailed,
    CreateComplete,
    RollbackInProgress,
    RollbackFailed,
    RollbackComplete,
    UpdateInProgress,
    UpdateCompleteCleanupInProgress,
    UpdateComplete,
    UpdateRollbackInProgress,
    UpdateRollbackFailed,
    UpdateRollbackCompleteCleanupInProgress,
    UpdateRollbackComplete,
    DeleteInProgress,
    DeleteFailed,
    DeleteComplete,
}

impl StackState {
    pub fn as_str(&self) -> &'static str {
        match self {
            StackState::CreateInProgress => "CREATE_IN_PROGRESS",
            StackState::CreateFailed => "CREATE_FAILED",
            StackState::CreateComplete => "CREATE_COMPLETE",
            StackState::RollbackInProgress => "ROLLBACK_IN_PROGRESS",
            StackState::RollbackFailed => "ROLLBACK_FAILED",
            StackState::RollbackComplete => "ROLLBACK_COMPLETE",
            StackState::UpdateInProgress => "UPDATE_IN_PROGRESS",
            StackState::UpdateCompleteCleanupInProgress => "UPDATE_COMPLETE_CLEANUP_IN_PROGRESS",
            StackState::UpdateComplete => "UPDATE_COMPLETE",
            StackState::UpdateRollbackInProgress => "UPDATE_ROLLBACK_IN_PROGRESS",
            StackState::UpdateRollbackFailed => "UPDATE_ROLLBACK_FAILED",
            StackState::UpdateRollbackCompleteCleanupInProgress => {
                "UPDATE_ROLLBACK_COMPLETE_CLEANUP_IN_PROGRESS"
            }
            StackState::UpdateRollbackComplete => "UPDATE_ROLLBACK_COMPLETE",
            StackState::DeleteInProgress => "DELETE_IN_PROGRESS",
            StackState::DeleteFailed => "DELETE_FAILED",
            StackState::DeleteComplete => "DELETE_COMPLETE",
        }
    }

    pub fn is_in_progress(&self) -> bool {
        self.as_str().ends_with("_IN_PROGRESS")
    }

    /// A create or update that finished cleanly.
    pub fn is_complete(&self) -> bool {
        matches!(self, StackState::CreateComplete | StackState::UpdateComplete)
    }

    /// The last create or update is being, or has been, rolled back.
    pub fn is_rollback(&self) -> bool {
        matches!(
            self,
            StackState::RollbackInProgress
                | StackState::RollbackFailed
                | StackState::RollbackComplete
                | StackState::UpdateRollbackInProgress
                | StackState::UpdateRollbackFailed
                | StackState::UpdateRollbackCompleteCleanupInProgress
                | StackState::UpdateRollbackComplete
        )
    }

    pub fn is_failed(&self) -> bool {
        self.as_str().ends_with("_FAILED")
    }

    pub fn is_deleted(&self) -> bool {
        matches!(self, StackState::DeleteComplete)
    }
}

impl fmt::Display for StackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the provider reports about one stack.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderStack {
    pub fqn: String,
    pub state: StackState,
    /// Hash of the template the stack was last submitted with.
    pub template_hash: Option<String>,
    #[serde(default)]
    pub outputs: BTreeMap<String, String>,
}

/// A create or update submission.
#[derive(Debug, Clone, PartialEq)]
pub struct StackRequest {
    pub fqn: String,
    pub template: RenderedTemplate,
    pub tags: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    Submitted,
    /// The submitted template matches what is deployed.
    NoChange,
}

/// Stack operations as seen by the step actions.
///
/// Every call submits or checks and returns; completion is observed by
/// polling [`Provider::describe_stack`].
#[async_trait]
pub trait Provider: Send + Sync {
    /// `None` when the stack does not exist.
    async fn describe_stack(&self, fqn: &str) -> Result<Option<ProviderStack>>;

    async fn create_stack(&self, request: &StackRequest) -> Result<()>;

    async fn update_stack(&self, request: &StackRequest) -> Result<UpdateOutcome>;

    async fn destroy_stack(&self, fqn: &str) -> Result<()>;

    async fn get_outputs(&self, fqn: &str) -> Result<BTreeMap<String, String>>;
}
