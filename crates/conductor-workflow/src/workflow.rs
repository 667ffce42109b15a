use std::collections::HashMap;

use chrono::{DateTime, Utc};
use conductor_config::WorkflowDef;
use serde::Serialize;

use crate::error::WorkflowError;
use crate::graph::Graph;
use crate::node::TaskNode;
use crate::status::WorkflowStatus;

/// Policy applied to tasks whose definition leaves it out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskDefaults {
  pub max_retries: u32,
  pub timeout_ms: u64,
}

impl Default for TaskDefaults {
  fn default() -> Self {
    Self {
      max_retries: 3,
      timeout_ms: 300_000,
    }
  }
}

/// A validated workflow: a DAG of task nodes plus workflow-level state.
///
/// Tasks are kept in definition order; lookups by id go through an index.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Workflow {
  pub workflow_id: String,
  pub name: String,
  pub status: WorkflowStatus,
  pub created_at: DateTime<Utc>,
  pub started_at: Option<DateTime<Utc>>,
  pub completed_at: Option<DateTime<Utc>>,
  pub error: Option<String>,
  pub tasks: Vec<TaskNode>,
  #[serde(skip)]
  index: HashMap<String, usize>,
}

impl Workflow {
  /// Validate a definition and build a pending workflow from it.
  ///
  /// `is_registered` decides whether a task name resolves to a runnable task.
  /// Nothing is built when any check fails.
  pub fn from_def<F>(
    workflow_id: impl Into<String>,
    def: &WorkflowDef,
    defaults: &TaskDefaults,
    is_registered: F,
  ) -> Result<Self, WorkflowError>
  where
    F: Fn(&str) -> bool,
  {
    let mut index = HashMap::with_capacity(def.tasks.len());
    for (i, task) in def.tasks.iter().enumerate() {
      if task.task_id.is_empty() {
        return Err(WorkflowError::EmptyTaskId);
      }
      if index.insert(task.task_id.clone(), i).is_some() {
        return Err(WorkflowError::DuplicateTaskId(task.task_id.clone()));
      }
    }

    for task in &def.tasks {
      for dep in &task.dependencies {
        if *dep == task.task_id {
          return Err(WorkflowError::SelfDependency(task.task_id.clone()));
        }
        if !index.contains_key(dep) {
          return Err(WorkflowError::UnknownDependency {
            task_id: task.task_id.clone(),
            dependency: dep.clone(),
          });
        }
      }
    }

    if let Some(task) = def.tasks.iter().find(|t| !is_registered(t.task_name.as_str())) {
      return Err(WorkflowError::UnknownTaskName {
        task_id: task.task_id.clone(),
        task_name: task.task_name.clone(),
      });
    }

    Ok(Self {
      workflow_id: workflow_id.into(),
      name: def.name.clone(),
      status: WorkflowStatus::Pending,
      created_at: Utc::now(),
      started_at: None,
      completed_at: None,
      error: None,
      tasks: def
        .tasks
        .iter()
        .map(|t| TaskNode::from_def(t, defaults))
        .collect(),
      index,
    })
  }

  /// Get a task by ID.
  pub fn get_task(&self, task_id: &str) -> Option<&TaskNode> {
    self.index.get(task_id).map(|&i| &self.tasks[i])
  }

  pub fn get_task_mut(&mut self, task_id: &str) -> Option<&mut TaskNode> {
    match self.index.get(task_id) {
      Some(&i) => Some(&mut self.tasks[i]),
      None => None,
    }
  }

  /// Task ids in definition order.
  pub fn task_ids(&self) -> impl Iterator<Item = &str> {
    self.tasks.iter().map(|t| t.task_id.as_str())
  }

  /// Build the graph structure for traversal.
  pub fn graph(&self) -> Graph {
    Graph::new(&self.tasks)
  }

  pub fn is_terminal(&self) -> bool {
    self.status.is_terminal()
  }
}
