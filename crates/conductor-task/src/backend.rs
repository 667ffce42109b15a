//! The task execution backend contract.

use async_trait::async_trait;
use tokio::sync::oneshot;
use tokio::sync::oneshot::error::TryRecvError;
use tokio_util::sync::CancellationToken;

use crate::error::{BackendError, TaskError};
use crate::registry::TaskOutcome;

/// A unit of work handed to a backend.
#[derive(Debug, Clone)]
pub struct TaskRequest {
  pub workflow_id: String,
  pub task_id: String,
  pub task_name: String,
  pub args: serde_json::Value,
  pub attempt: u32,
}

/// Result of polling a [`TaskHandle`].
#[derive(Debug, Clone, PartialEq)]
pub enum TaskPoll {
  Running,
  Succeeded(serde_json::Value),
  Failed(TaskError),
}

impl From<TaskOutcome> for TaskPoll {
  fn from(outcome: TaskOutcome) -> Self {
    match outcome {
      Ok(value) => Self::Succeeded(value),
      Err(e) => Self::Failed(e),
    }
  }
}

/// Handle to submitted work.
///
/// The backend reports the outcome through a oneshot channel; the handle
/// caches it so repeated polls and waits return the same outcome.
#[derive(Debug)]
pub struct TaskHandle {
  handle_id: String,
  task_name: String,
  outcome: oneshot::Receiver<TaskOutcome>,
  finished: Option<TaskOutcome>,
  cancel: CancellationToken,
}

impl TaskHandle {
  pub fn new(
    handle_id: impl Into<String>,
    task_name: impl Into<String>,
    outcome: oneshot::Receiver<TaskOutcome>,
    cancel: CancellationToken,
  ) -> Self {
    Self {
      handle_id: handle_id.into(),
      task_name: task_name.into(),
      outcome,
      finished: None,
      cancel,
    }
  }

  pub fn handle_id(&self) -> &str {
    &self.handle_id
  }

  pub fn task_name(&self) -> &str {
    &self.task_name
  }

  /// Check for completion without waiting.
  pub fn poll(&mut self) -> TaskPoll {
    if let Some(outcome) = &self.finished {
      return outcome.clone().into();
    }

    let outcome = match self.outcome.try_recv() {
      Ok(outcome) => outcome,
      Err(TryRecvError::Empty) => return TaskPoll::Running,
      Err(TryRecvError::Closed) => Err(TaskError::Lost),
    };
    self.finished = Some(outcome.clone());
    outcome.into()
  }

  /// Wait for the outcome.
  ///
  /// Cancel safe: dropping the future before it resolves leaves the handle
  /// usable, so callers can bound the wait with `tokio::time::timeout`.
  pub async fn wait(&mut self) -> TaskOutcome {
    if let Some(outcome) = &self.finished {
      return outcome.clone();
    }

    let outcome = (&mut self.outcome).await.unwrap_or(Err(TaskError::Lost));
    self.finished = Some(outcome.clone());
    outcome
  }

  /// Request that the work stop. Best effort; see the backend.
  pub fn cancel(&self) {
    self.cancel.cancel();
  }

  pub fn is_cancelled(&self) -> bool {
    self.cancel.is_cancelled()
  }
}

/// Where tasks actually run.
///
/// `submit` enqueues work and returns a handle. The cancellation token passed
/// in is owned by the caller; cancelling it (or calling [`cancel`]) is a
/// request for the backend to stop the work, not a guarantee.
///
/// [`cancel`]: TaskExecutionBackend::cancel
#[async_trait]
pub trait TaskExecutionBackend: Send + Sync {
  /// Enqueue a unit of work.
  ///
  /// Fails with [`BackendError::UnknownTask`] if the backend cannot run
  /// `request.task_name`.
  async fn submit(
    &self,
    request: TaskRequest,
    cancel: CancellationToken,
  ) -> Result<TaskHandle, BackendError>;

  fn poll(&self, handle: &mut TaskHandle) -> TaskPoll {
    handle.poll()
  }

  fn cancel(&self, handle: &TaskHandle) {
    handle.cancel();
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[tokio::test]
  async fn test_poll_then_wait_return_same_outcome() {
    let (sender, receiver) = oneshot::channel();
    let mut handle = TaskHandle::new("h1", "noop", receiver, CancellationToken::new());

    assert_eq!(handle.poll(), TaskPoll::Running);

    sender.send(Ok(json!(7))).unwrap();

    assert_eq!(handle.poll(), TaskPoll::Succeeded(json!(7)));
    assert_eq!(handle.poll(), TaskPoll::Succeeded(json!(7)));
    assert_eq!(handle.wait().await, Ok(json!(7)));
  }

  #[tokio::test]
  async fn test_dropped_sender_reports_lost() {
    let (sender, receiver) = oneshot::channel::<TaskOutcome>();
    let mut handle = TaskHandle::new("h2", "noop", receiver, CancellationToken::new());
    drop(sender);

    assert_eq!(handle.wait().await, Err(TaskError::Lost));
    assert_eq!(handle.poll(), TaskPoll::Failed(TaskError::Lost));
  }

  #[tokio::test]
  async fn test_wait_survives_timeout() {
    let (sender, receiver) = oneshot::channel();
    let mut handle = TaskHandle::new("h3", "noop", receiver, CancellationToken::new());

    let timed_out =
      tokio::time::timeout(std::time::Duration::from_millis(10), handle.wait()).await;
    assert!(timed_out.is_err());

    sender.send(Err(TaskError::failed("late"))).unwrap();
    assert_eq!(handle.wait().await, Err(TaskError::failed("late")));
  }

  #[test]
  fn test_cancel_fires_token() {
    let (_sender, receiver) = oneshot::channel::<TaskOutcome>();
    let token = CancellationToken::new();
    let handle = TaskHandle::new("h4", "noop", receiver, token.clone());

    handle.cancel();

    assert!(token.is_cancelled());
    assert!(handle.is_cancelled());
  }
}
