//! Error types for workflow orchestration.

use conductor_workflow::{WorkflowError, WorkflowStatus};
use thiserror::Error;

/// Errors returned synchronously by orchestrator calls.
///
/// Task-level failures never show up here; they are recorded on the task and
/// reflected in the workflow's status.
#[derive(Debug, Error)]
pub enum OrchestratorError {
  /// The definition is structurally invalid. Nothing was created.
  #[error("invalid workflow definition: {source}")]
  InvalidWorkflowDefinition {
    #[source]
    source: WorkflowError,
  },

  /// A task names a function that is not registered. Nothing was created.
  #[error("task '{task_id}' uses unknown task name '{task_name}'")]
  UnknownTaskName { task_id: String, task_name: String },

  #[error("workflow already exists: {0}")]
  WorkflowAlreadyExists(String),

  #[error("workflow not found: {0}")]
  WorkflowNotFound(String),

  #[error("workflow already running: {0}")]
  WorkflowAlreadyRunning(String),

  /// The workflow reached a terminal status; create a new one to run again.
  #[error("workflow '{workflow_id}' already finished with status {status}")]
  WorkflowAlreadyFinished {
    workflow_id: String,
    status: WorkflowStatus,
  },
}

impl From<WorkflowError> for OrchestratorError {
  fn from(err: WorkflowError) -> Self {
    match err {
      WorkflowError::UnknownTaskName { task_id, task_name } => {
        Self::UnknownTaskName { task_id, task_name }
      }
      source => Self::InvalidWorkflowDefinition { source },
    }
  }
}
