//! Name to task function registry.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, RwLock};

use futures::FutureExt;
use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::TaskError;

/// What a task function resolves to.
pub type TaskOutcome = Result<serde_json::Value, TaskError>;

/// A registered unit of work.
pub type TaskFn = Arc<dyn Fn(TaskContext) -> BoxFuture<'static, TaskOutcome> + Send + Sync>;

/// Everything a task function gets for one dispatch.
#[derive(Debug, Clone)]
pub struct TaskContext {
  pub workflow_id: String,
  pub task_id: String,
  pub task_name: String,
  /// Arguments from the task definition.
  pub args: serde_json::Value,
  /// 1-based; greater than 1 on retries.
  pub attempt: u32,
  /// Fires when the task is revoked.
  pub cancel: CancellationToken,
}

/// Maps task names to task functions.
///
/// Safe for concurrent registration and lookup. Registering a name that is
/// already bound replaces the previous function.
pub struct TaskRegistry {
  tasks: RwLock<HashMap<String, TaskFn>>,
}

impl TaskRegistry {
  pub fn new() -> Self {
    Self {
      tasks: RwLock::new(HashMap::new()),
    }
  }

  /// Register a task function under `name`.
  pub fn register<F, Fut>(&self, name: impl Into<String>, task: F)
  where
    F: Fn(TaskContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = TaskOutcome> + Send + 'static,
  {
    let name = name.into();
    let task: TaskFn = Arc::new(move |ctx| task(ctx).boxed());

    let mut tasks = self.tasks.write().unwrap_or_else(|e| e.into_inner());
    if tasks.insert(name.clone(), task).is_some() {
      debug!(task_name = %name, "replaced existing task binding");
    }
    info!(task_name = %name, "registered task");
  }

  /// Look up the task function bound to `name`.
  pub fn get(&self, name: &str) -> Option<TaskFn> {
    let tasks = self.tasks.read().unwrap_or_else(|e| e.into_inner());
    tasks.get(name).cloned()
  }

  pub fn contains(&self, name: &str) -> bool {
    let tasks = self.tasks.read().unwrap_or_else(|e| e.into_inner());
    tasks.contains_key(name)
  }

  /// Registered names, sorted.
  pub fn names(&self) -> Vec<String> {
    let tasks = self.tasks.read().unwrap_or_else(|e| e.into_inner());
    let mut names: Vec<String> = tasks.keys().cloned().collect();
    names.sort();
    names
  }

  pub fn len(&self) -> usize {
    self.tasks.read().unwrap_or_else(|e| e.into_inner()).len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}

impl Default for TaskRegistry {
  fn default() -> Self {
    Self::new()
  }
}
