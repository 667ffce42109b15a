//! Backend that runs registered task functions on the tokio runtime.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info_span, warn};

use crate::backend::{TaskExecutionBackend, TaskHandle, TaskRequest};
use crate::error::{BackendError, TaskError};
use crate::registry::{TaskContext, TaskRegistry};

/// Executes tasks in the current process.
///
/// Each submission is spawned as its own tokio task and raced against its
/// cancellation token, so revoking a handle drops the task future at its next
/// await point. Panics inside a task function are reported as
/// [`TaskError::Panicked`].
pub struct InProcessBackend {
  registry: Arc<TaskRegistry>,
}

impl InProcessBackend {
  pub fn new(registry: Arc<TaskRegistry>) -> Self {
    Self { registry }
  }
}

#[async_trait]
impl TaskExecutionBackend for InProcessBackend {
  async fn submit(
    &self,
    request: TaskRequest,
    cancel: CancellationToken,
  ) -> Result<TaskHandle, BackendError> {
    let task = self
      .registry
      .get(&request.task_name)
      .ok_or_else(|| BackendError::UnknownTask(request.task_name.clone()))?;

    let handle_id = uuid::Uuid::new_v4().to_string();
    let (sender, receiver) = oneshot::channel();

    let span = info_span!(
      "task_execute",
      workflow_id = %request.workflow_id,
      task_id = %request.task_id,
      task_name = %request.task_name,
      attempt = request.attempt,
      handle_id = %handle_id,
    );

    let ctx = TaskContext {
      workflow_id: request.workflow_id,
      task_id: request.task_id,
      task_name: request.task_name.clone(),
      args: request.args,
      attempt: request.attempt,
      cancel: cancel.clone(),
    };
    let token = cancel.clone();

    tokio::spawn(
      async move {
        debug!("task started");

        let outcome = tokio::select! {
          biased;
          _ = token.cancelled() => Err(TaskError::Revoked),
          result = AssertUnwindSafe(task(ctx)).catch_unwind() => match result {
            Ok(outcome) => outcome,
            Err(panic) => Err(TaskError::Panicked(panic_message(panic.as_ref()))),
          },
        };

        match &outcome {
          Ok(_) => debug!("task finished"),
          Err(TaskError::Revoked) => debug!("task revoked"),
          Err(e) => warn!(error = %e, "task finished with error"),
        }

        // The handle may already be gone (workflow cancelled or timed out).
        let _ = sender.send(outcome);
      }
      .instrument(span),
    );

    Ok(TaskHandle::new(handle_id, request.task_name, receiver, cancel))
  }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
  if let Some(s) = panic.downcast_ref::<&str>() {
    s.to_string()
  } else if let Some(s) = panic.downcast_ref::<String>() {
    s.clone()
  } else {
    "unknown panic payload".to_string()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::backend::TaskPoll;
  use serde_json::json;
  use std::time::Duration;

  fn request(task_name: &str, args: serde_json::Value) -> TaskRequest {
    TaskRequest {
      workflow_id: "wf".to_string(),
      task_id: "t1".to_string(),
      task_name: task_name.to_string(),
      args,
      attempt: 1,
    }
  }

  fn backend() -> InProcessBackend {
    let registry = Arc::new(TaskRegistry::new());
    registry.register("echo", |ctx: TaskContext| async move { Ok(ctx.args) });
    registry.register("fail", |_ctx| async { Err(TaskError::failed("boom")) });
    registry.register("hang", |_ctx| async {
      tokio::time::sleep(Duration::from_secs(60)).await;
      Ok(serde_json::Value::Null)
    });
    registry.register("panic", |_ctx| async {
      if true {
        panic!("exploded");
      }
      Ok(serde_json::Value::Null)
    });
    InProcessBackend::new(registry)
  }

  #[tokio::test]
  async fn test_submit_runs_registered_task() {
    let backend = backend();
    let mut handle = backend
      .submit(request("echo", json!({ "x": 1 })), CancellationToken::new())
      .await
      .unwrap();

    assert_eq!(handle.wait().await, Ok(json!({ "x": 1 })));
    assert_eq!(backend.poll(&mut handle), TaskPoll::Succeeded(json!({ "x": 1 })));
    assert_eq!(handle.task_name(), "echo");
  }

  #[tokio::test]
  async fn test_submit_unknown_task_fails() {
    let backend = backend();
    let err = backend
      .submit(request("nope", json!(null)), CancellationToken::new())
      .await
      .unwrap_err();

    assert!(matches!(err, BackendError::UnknownTask(name) if name == "nope"));
  }

  #[tokio::test]
  async fn test_task_failure_is_reported() {
    let backend = backend();
    let mut handle = backend
      .submit(request("fail", json!(null)), CancellationToken::new())
      .await
      .unwrap();

    assert_eq!(handle.wait().await, Err(TaskError::failed("boom")));
  }

  #[tokio::test]
  async fn test_cancel_revokes_running_task() {
    let backend = backend();
    let mut handle = backend
      .submit(request("hang", json!(null)), CancellationToken::new())
      .await
      .unwrap();

    assert_eq!(backend.poll(&mut handle), TaskPoll::Running);
    backend.cancel(&handle);

    let outcome = tokio::time::timeout(Duration::from_secs(5), handle.wait())
      .await
      .expect("revoked task should finish promptly");
    assert_eq!(outcome, Err(TaskError::Revoked));
  }

  #[tokio::test]
  async fn test_parent_token_revokes_child_submissions() {
    let backend = backend();
    let parent = CancellationToken::new();
    let mut handle = backend
      .submit(request("hang", json!(null)), parent.child_token())
      .await
      .unwrap();

    parent.cancel();

    assert_eq!(handle.wait().await, Err(TaskError::Revoked));
  }

  #[tokio::test]
  async fn test_panic_is_captured() {
    let backend = backend();
    let mut handle = backend
      .submit(request("panic", json!(null)), CancellationToken::new())
      .await
      .unwrap();

    assert_eq!(
      handle.wait().await,
      Err(TaskError::Panicked("exploded".to_string()))
    );
  }
}
