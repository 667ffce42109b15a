use std::fmt;

use serde::{Deserialize, Serialize};

/// Execution state of a single task.
///
/// `Pending` is initial. `Success`, `Failure` and `Revoked` are terminal.
/// `Retry` loops back to `Running` on the next dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
  Pending,
  Running,
  Success,
  Failure,
  Retry,
  Revoked,
}

impl TaskStatus {
  pub fn is_terminal(self) -> bool {
    matches!(self, Self::Success | Self::Failure | Self::Revoked)
  }

  /// Whether a task in this state may be dispatched once its dependencies succeed.
  pub fn is_dispatchable(self) -> bool {
    matches!(self, Self::Pending | Self::Retry)
  }

  pub fn as_str(self) -> &'static str {
    match self {
      Self::Pending => "pending",
      Self::Running => "running",
      Self::Success => "success",
      Self::Failure => "failure",
      Self::Retry => "retry",
      Self::Revoked => "revoked",
    }
  }
}

impl fmt::Display for TaskStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Execution state of a workflow.
///
/// `Pending` is initial; `Completed`, `Failed` and `Cancelled` are terminal
/// and never left once reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
  Pending,
  Running,
  Completed,
  Failed,
  Cancelled,
}

impl WorkflowStatus {
  pub fn is_terminal(self) -> bool {
    matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
  }

  pub fn as_str(self) -> &'static str {
    match self {
      Self::Pending => "pending",
      Self::Running => "running",
      Self::Completed => "completed",
      Self::Failed => "failed",
      Self::Cancelled => "cancelled",
    }
  }
}

impl fmt::Display for WorkflowStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_task_terminal_states() {
    assert!(TaskStatus::Success.is_terminal());
    assert!(TaskStatus::Failure.is_terminal());
    assert!(TaskStatus::Revoked.is_terminal());
    assert!(!TaskStatus::Retry.is_terminal());
    assert!(!TaskStatus::Running.is_terminal());
  }

  #[test]
  fn test_only_pending_and_retry_are_dispatchable() {
    assert!(TaskStatus::Pending.is_dispatchable());
    assert!(TaskStatus::Retry.is_dispatchable());
    assert!(!TaskStatus::Running.is_dispatchable());
    assert!(!TaskStatus::Failure.is_dispatchable());
  }

  #[test]
  fn test_status_serializes_snake_case() {
    assert_eq!(
      serde_json::to_value(WorkflowStatus::Cancelled).unwrap(),
      "cancelled"
    );
    assert_eq!(TaskStatus::Revoked.to_string(), "revoked");
  }
}
