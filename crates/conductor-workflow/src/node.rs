use std::time::Duration;

use chrono::{DateTime, Utc};
use conductor_config::TaskDef;
use serde::{Deserialize, Serialize};

use crate::status::TaskStatus;
use crate::workflow::TaskDefaults;

/// What a backend-reported failure did to a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureDisposition {
  /// A retry was consumed; the task is `Retry` and will be re-dispatched.
  Retry,
  /// The retry budget is spent; the task is `Failure`.
  Exhausted,
}

/// The scheduling unit: identity, dependencies, policy and execution state.
///
/// Policy fields are fixed at creation. Execution state only changes through
/// the transition methods below, which the orchestrator calls on its
/// canonical copy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskNode {
  pub task_id: String,
  pub task_name: String,
  pub dependencies: Vec<String>,
  pub args: serde_json::Value,
  pub max_retries: u32,
  pub timeout_ms: u64,
  pub retry_count: u32,
  pub status: TaskStatus,
  pub result: Option<serde_json::Value>,
  pub error: Option<String>,
  pub started_at: Option<DateTime<Utc>>,
  pub completed_at: Option<DateTime<Utc>>,
}

impl TaskNode {
  /// Build a pending node from its definition. Repeated dependencies collapse
  /// to their first occurrence.
  pub fn from_def(def: &TaskDef, defaults: &TaskDefaults) -> Self {
    let mut dependencies: Vec<String> = Vec::with_capacity(def.dependencies.len());
    for dep in &def.dependencies {
      if !dependencies.contains(dep) {
        dependencies.push(dep.clone());
      }
    }

    Self {
      task_id: def.task_id.clone(),
      task_name: def.task_name.clone(),
      dependencies,
      args: def.args.clone(),
      max_retries: def.max_retries.unwrap_or(defaults.max_retries),
      timeout_ms: def.timeout_ms.unwrap_or(defaults.timeout_ms),
      retry_count: 0,
      status: TaskStatus::Pending,
      result: None,
      error: None,
      started_at: None,
      completed_at: None,
    }
  }

  pub fn timeout(&self) -> Duration {
    Duration::from_millis(self.timeout_ms)
  }

  /// 1-based number of the dispatch about to happen (or in flight).
  pub fn attempt(&self) -> u32 {
    self.retry_count + 1
  }

  pub fn mark_running(&mut self, now: DateTime<Utc>) {
    self.status = TaskStatus::Running;
    self.started_at = Some(now);
  }

  pub fn mark_succeeded(&mut self, result: serde_json::Value, now: DateTime<Utc>) {
    self.status = TaskStatus::Success;
    self.result = Some(result);
    self.error = None;
    self.completed_at = Some(now);
  }

  /// Record a backend-reported failure, consuming a retry if any are left.
  pub fn record_failure(&mut self, error: String, now: DateTime<Utc>) -> FailureDisposition {
    self.error = Some(error);
    if self.retry_count < self.max_retries {
      self.retry_count += 1;
      self.status = TaskStatus::Retry;
      FailureDisposition::Retry
    } else {
      self.status = TaskStatus::Failure;
      self.completed_at = Some(now);
      FailureDisposition::Exhausted
    }
  }

  /// Fail without consuming a retry (timeouts, rejected submissions).
  pub fn mark_failed(&mut self, error: String, now: DateTime<Utc>) {
    self.status = TaskStatus::Failure;
    self.error = Some(error);
    self.completed_at = Some(now);
  }

  /// Stop the task for good; `reason` says who revoked it.
  pub fn mark_revoked(&mut self, reason: String, now: DateTime<Utc>) {
    self.status = TaskStatus::Revoked;
    self.error = Some(reason);
    self.completed_at = Some(now);
  }
}
