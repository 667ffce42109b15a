use serde::{Deserialize, Serialize};

use crate::task::TaskDef;

/// Declarative definition of a workflow: a named list of tasks with
/// dependency edges expressed on the tasks themselves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDef {
  /// Generated by the orchestrator when absent.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub workflow_id: Option<String>,
  pub name: String,
  #[serde(default)]
  pub tasks: Vec<TaskDef>,
}

impl WorkflowDef {
  pub fn new(workflow_id: impl Into<String>, name: impl Into<String>, tasks: Vec<TaskDef>) -> Self {
    Self {
      workflow_id: Some(workflow_id.into()),
      name: name.into(),
      tasks,
    }
  }

  /// Get a task definition by ID.
  pub fn get_task(&self, task_id: &str) -> Option<&TaskDef> {
    self.tasks.iter().find(|t| t.task_id == task_id)
  }
}
