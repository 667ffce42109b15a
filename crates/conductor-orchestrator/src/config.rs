use conductor_workflow::TaskDefaults;
use serde::{Deserialize, Serialize};

/// Orchestrator-wide settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
  /// Retry budget for tasks that do not set `max_retries`.
  pub default_max_retries: u32,
  /// Timeout for tasks that do not set `timeout_ms`.
  pub default_timeout_ms: u64,
}

impl OrchestratorConfig {
  pub fn task_defaults(&self) -> TaskDefaults {
    TaskDefaults {
      max_retries: self.default_max_retries,
      timeout_ms: self.default_timeout_ms,
    }
  }
}

impl Default for OrchestratorConfig {
  fn default() -> Self {
    let defaults = TaskDefaults::default();
    Self {
      default_max_retries: defaults.max_retries,
      default_timeout_ms: defaults.timeout_ms,
    }
  }
}
