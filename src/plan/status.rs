use std::fmt;

use serde::{Deserialize, Serialize};

/// Where a step is in its lifecycle.
///
/// `Pending` and `Submitted` are in flight; everything else is terminal.
/// Only `Complete` and `Skipped` count as a successful outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum Status {
    Pending,
    Submitted(Option<String>),
    Complete(Option<String>),
    Skipped(Option<String>),
    Failed(Option<String>),
    /// The run was interrupted before this step finished.
    Cancelled(Option<String>),
}

impl Default for Status {
    fn default() -> Self {
        Status::Pending
    }
}

impl Status {
    pub fn submitted<S: Into<String>>(reason: S) -> Self {
        Status::Submitted(Some(reason.into()))
    }

    pub fn complete<S: Into<String>>(reason: S) -> Self {
        Status::Complete(Some(reason.into()))
    }

    pub fn skipped<S: Into<String>>(reason: S) -> Self {
        Status::Skipped(Some(reason.into()))
    }

    pub fn failed<S: Into<String>>(reason: S) -> Self {
        Status::Failed(Some(reason.into()))
    }

    pub fn cancelled<S: Into<String>>(reason: S) -> Self {
        Status::Cancelled(Some(reason.into()))
    }

    pub fn name(&self) -> &'static str {
        match self {
            Status::Pending => "pending",
            Status::Submitted(_) => "submitted",
            Status::Complete(_) => "complete",
            Status::Skipped(_) => "skipped",
            Status::Failed(_) => "failed",
            Status::Cancelled(_) => "cancelled",
        }
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            Status::Pending => None,
            Status::Submitted(r)
            | Status::Complete(r)
            | Status::Skipped(r)
            | Status::Failed(r)
            | Status::Cancelled(r) => r.as_deref(),
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Status::Pending)
    }

    pub fn is_submitted(&self) -> bool {
        matches!(self, Status::Submitted(_))
    }

    pub fn is_complete(&self) -> bool {
        matches!(self, Status::Complete(_))
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, Status::Skipped(_))
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Status::Failed(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Status::Cancelled(_))
    }

    /// Terminal: the step will not be advanced again.
    pub fn is_done(&self) -> bool {
        !matches!(self, Status::Pending | Status::Submitted(_))
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Status::Complete(_) | Status::Skipped(_))
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.reason() {
            Some(reason) => write!(f, "{} ({})", self.name(), reason),
            None => write!(f, "{}", self.name()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_predicates() {
        assert!(!Status::Pending.is_done());
        assert!(!Status::submitted("creating new stack").is_done());
        for status in [
            Status::complete("creating new stack"),
            Status::skipped("nochange"),
            Status::failed("rolling back update"),
            Status::cancelled("interrupted"),
        ] {
            assert!(status.is_done(), "{status} should be done");
        }
    }

    #[test]
    fn test_ok_only_for_complete_and_skipped() {
        assert!(Status::Complete(None).is_ok());
        assert!(Status::skipped("locked").is_ok());
        assert!(!Status::failed("boom").is_ok());
        assert!(!Status::cancelled("interrupted").is_ok());
        assert!(!Status::Pending.is_ok());
    }

    #[test]
    fn test_display_and_equality() {
        assert_eq!(Status::skipped("nochange").to_string(), "skipped (nochange)");
        assert_eq!(Status::Pending.to_string(), "pending");
        assert_ne!(Status::submitted("creating"), Status::submitted("updating"));
        assert_eq!(Status::failed("x").reason(), Some("x"));
    }

    #[test]
    fn test_serde_shape() {
        let json = serde_json::to_value(Status::skipped("locked")).unwrap();
        assert_eq!(json, serde_json::json!({"status": "skipped", "reason": "locked"}));
        let back: Status = serde_json::from_value(json).unwrap();
        assert_eq!(back, Status::skipped("locked"));
    }
}
