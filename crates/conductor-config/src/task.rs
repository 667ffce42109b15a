use serde::{Deserialize, Serialize};

/// Declarative definition of a single task within a workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskDef {
  /// Identifier unique within the workflow.
  pub task_id: String,
  /// Name the task function is registered under.
  pub task_name: String,
  /// Task ids that must succeed before this task is dispatched.
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub dependencies: Vec<String>,
  /// Arguments handed to the task function on every dispatch.
  #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
  pub args: serde_json::Value,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub max_retries: Option<u32>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub timeout_ms: Option<u64>,
}

impl TaskDef {
  /// A task with no dependencies, no arguments and default policy.
  pub fn new(task_id: impl Into<String>, task_name: impl Into<String>) -> Self {
    Self {
      task_id: task_id.into(),
      task_name: task_name.into(),
      dependencies: Vec::new(),
      args: serde_json::Value::Null,
      max_retries: None,
      timeout_ms: None,
    }
  }

  pub fn depends_on<I, S>(mut self, dependencies: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    self
      .dependencies
      .extend(dependencies.into_iter().map(Into::into));
    self
  }

  pub fn with_args(mut self, args: serde_json::Value) -> Self {
    self.args = args;
    self
  }

  pub fn with_max_retries(mut self, max_retries: u32) -> Self {
    self.max_retries = Some(max_retries);
    self
  }

  pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
    self.timeout_ms = Some(timeout_ms);
    self
  }
}
