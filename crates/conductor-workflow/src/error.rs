use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkflowError {
  #[error("task id must not be empty")]
  EmptyTaskId,

  #[error("duplicate task id: {0}")]
  DuplicateTaskId(String),

  #[error("task '{task_id}' depends on unknown task '{dependency}'")]
  UnknownDependency { task_id: String, dependency: String },

  #[error("task '{0}' depends on itself")]
  SelfDependency(String),

  #[error("task '{task_id}' references unregistered task name '{task_name}'")]
  UnknownTaskName { task_id: String, task_name: String },
}
