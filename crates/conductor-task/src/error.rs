//! Task and backend errors.

/// Why a single task execution did not produce a result.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TaskError {
  /// The task function reported a failure.
  #[error("{0}")]
  Failed(String),

  /// The task function panicked.
  #[error("task panicked: {0}")]
  Panicked(String),

  /// The task was revoked before it finished.
  #[error("task revoked")]
  Revoked,

  /// The backend dropped the task without reporting an outcome.
  #[error("task outcome lost")]
  Lost,
}

impl TaskError {
  pub fn failed(message: impl Into<String>) -> Self {
    Self::Failed(message.into())
  }
}

impl From<String> for TaskError {
  fn from(message: String) -> Self {
    Self::Failed(message)
  }
}

impl From<&str> for TaskError {
  fn from(message: &str) -> Self {
    Self::Failed(message.to_string())
  }
}

/// Errors raised by a backend when accepting work.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
  /// No task function is registered under this name.
  #[error("unknown task: {0}")]
  UnknownTask(String),

  /// The backend could not accept the submission.
  #[error("backend unavailable: {0}")]
  Unavailable(String),
}
