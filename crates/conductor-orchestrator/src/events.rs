//! Workflow events and notifiers.
//!
//! The orchestrator emits an event at every externally visible transition so
//! callers can follow a run without polling `get_workflow_status`.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Events emitted while a workflow executes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WorkflowEvent {
  WorkflowStarted {
    workflow_id: String,
  },

  /// A task was dispatched. `attempt` is 1 for the first dispatch.
  TaskStarted {
    workflow_id: String,
    task_id: String,
    attempt: u32,
  },

  TaskSucceeded {
    workflow_id: String,
    task_id: String,
    result: serde_json::Value,
  },

  /// A task failed and consumed a retry; it runs again in the next wave.
  TaskRetrying {
    workflow_id: String,
    task_id: String,
    retry_count: u32,
    error: String,
  },

  /// A task reached `Failure` or was revoked by its backend.
  TaskFailed {
    workflow_id: String,
    task_id: String,
    error: String,
  },

  WorkflowCompleted {
    workflow_id: String,
  },

  WorkflowFailed {
    workflow_id: String,
    error: String,
  },

  WorkflowCancelled {
    workflow_id: String,
  },
}

impl WorkflowEvent {
  pub fn workflow_id(&self) -> &str {
    match self {
      Self::WorkflowStarted { workflow_id }
      | Self::TaskStarted { workflow_id, .. }
      | Self::TaskSucceeded { workflow_id, .. }
      | Self::TaskRetrying { workflow_id, .. }
      | Self::TaskFailed { workflow_id, .. }
      | Self::WorkflowCompleted { workflow_id }
      | Self::WorkflowFailed { workflow_id, .. }
      | Self::WorkflowCancelled { workflow_id } => workflow_id,
    }
  }
}

/// Receives workflow events.
///
/// `notify` is called outside the orchestrator's state lock, so an
/// implementation may call back into the orchestrator.
pub trait WorkflowNotifier: Send + Sync {
  fn notify(&self, event: WorkflowEvent);
}

/// Discards all events.
#[derive(Debug, Clone, Default)]
pub struct NoopNotifier;

impl WorkflowNotifier for NoopNotifier {
  fn notify(&self, _event: WorkflowEvent) {}
}

/// Forwards events to an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
  // Unbounded so a slow consumer never stalls the wave loop.
  sender: mpsc::UnboundedSender<WorkflowEvent>,
}

impl ChannelNotifier {
  pub fn new(sender: mpsc::UnboundedSender<WorkflowEvent>) -> Self {
    Self { sender }
  }
}

impl WorkflowNotifier for ChannelNotifier {
  fn notify(&self, event: WorkflowEvent) {
    // Receiver may have been dropped
    let _ = self.sender.send(event);
  }
}
