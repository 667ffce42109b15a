//! The workflow orchestrator and its wave loop.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use conductor_config::WorkflowDef;
use conductor_task::{
  InProcessBackend, TaskContext, TaskError, TaskExecutionBackend, TaskOutcome, TaskRegistry,
  TaskRequest,
};
use conductor_workflow::{FailureDisposition, TaskStatus, Workflow, WorkflowStatus};
use futures::stream::{FuturesUnordered, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::config::OrchestratorConfig;
use crate::error::OrchestratorError;
use crate::events::{NoopNotifier, WorkflowEvent, WorkflowNotifier};

/// A workflow in the table plus the token that revokes its in-flight tasks.
struct WorkflowEntry {
  workflow: Workflow,
  cancel: CancellationToken,
}

/// One task of a wave, ready to hand to the backend.
struct Dispatch {
  task_id: String,
  timeout: Duration,
  request: TaskRequest,
}

enum DispatchOutcome {
  Succeeded(serde_json::Value),
  Failed(String),
  Revoked,
  TimedOut(Duration),
  Rejected(String),
}

/// A dispatched task's outcome and when it was observed.
struct Settled {
  task_id: String,
  outcome: DispatchOutcome,
  at: DateTime<Utc>,
}

enum Step {
  Dispatch(Vec<Dispatch>),
  Done(Workflow),
}

/// Tasks that reached `Success`, and tasks that reached `Failure` or `Revoked`.
#[derive(Default)]
struct Progress {
  completed: HashSet<String>,
  failed: HashSet<String>,
}

impl Progress {
  fn settled(&self) -> usize {
    self.completed.len() + self.failed.len()
  }

  fn is_settled(&self, task_id: &str) -> bool {
    self.completed.contains(task_id) || self.failed.contains(task_id)
  }
}

/// Schedules workflows over a [`TaskExecutionBackend`].
///
/// The orchestrator owns the in-memory workflow table. Every read and write
/// goes through one mutex that is never held across an await, so status
/// queries and cancellation stay responsive while a workflow executes.
pub struct WorkflowOrchestrator<N: WorkflowNotifier = NoopNotifier> {
  config: OrchestratorConfig,
  registry: Arc<TaskRegistry>,
  backend: Arc<dyn TaskExecutionBackend>,
  workflows: Mutex<HashMap<String, WorkflowEntry>>,
  notifier: N,
}

impl WorkflowOrchestrator<NoopNotifier> {
  /// Create an orchestrator that runs tasks in-process and emits no events.
  pub fn new(config: OrchestratorConfig) -> Self {
    Self::with_notifier(config, NoopNotifier)
  }
}

impl<N: WorkflowNotifier> WorkflowOrchestrator<N> {
  /// Create an orchestrator that runs tasks in-process and reports events to
  /// `notifier`.
  pub fn with_notifier(config: OrchestratorConfig, notifier: N) -> Self {
    let registry = Arc::new(TaskRegistry::new());
    let backend = Arc::new(InProcessBackend::new(Arc::clone(&registry)));
    Self::with_backend(config, registry, backend, notifier)
  }

  /// Create an orchestrator over a custom backend.
  ///
  /// `registry` decides which task names a workflow may reference; the backend
  /// is expected to be able to run every name registered there.
  pub fn with_backend(
    config: OrchestratorConfig,
    registry: Arc<TaskRegistry>,
    backend: Arc<dyn TaskExecutionBackend>,
    notifier: N,
  ) -> Self {
    Self {
      config,
      registry,
      backend,
      workflows: Mutex::new(HashMap::new()),
      notifier,
    }
  }

  pub fn registry(&self) -> &Arc<TaskRegistry> {
    &self.registry
  }

  /// Bind a task function to `name`. Workflows created afterwards may use it.
  pub fn register_task<F, Fut>(&self, name: impl Into<String>, task: F)
  where
    F: Fn(TaskContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = TaskOutcome> + Send + 'static,
  {
    self.registry.register(name, task);
  }

  /// Validate a definition and register it as a pending workflow.
  ///
  /// A missing `workflow_id` is replaced by a generated UUID. Nothing is
  /// registered when validation fails.
  pub fn create_workflow(&self, def: &WorkflowDef) -> Result<Workflow, OrchestratorError> {
    let workflow_id = def
      .workflow_id
      .clone()
      .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let workflow = Workflow::from_def(
      workflow_id.as_str(),
      def,
      &self.config.task_defaults(),
      |name| self.registry.contains(name),
    )?;

    let mut workflows = self.workflows();
    if workflows.contains_key(&workflow_id) {
      return Err(OrchestratorError::WorkflowAlreadyExists(workflow_id));
    }
    workflows.insert(
      workflow_id.clone(),
      WorkflowEntry {
        workflow: workflow.clone(),
        cancel: CancellationToken::new(),
      },
    );
    drop(workflows);

    info!(
      workflow_id = %workflow_id,
      name = %workflow.name,
      tasks = workflow.tasks.len(),
      "workflow_created"
    );
    Ok(workflow)
  }

  /// Run a pending workflow to a terminal status and return the final snapshot.
  ///
  /// Tasks run in waves: every task whose dependencies have all succeeded is
  /// dispatched at once, and the next wave is computed only after each member
  /// of the current one succeeded, failed, timed out or was revoked. Each
  /// task's outcome is recorded as soon as it settles.
  /// Task failures never surface as `Err`; inspect the returned workflow.
  #[instrument(name = "workflow_execute", skip(self), fields(workflow_id = %workflow_id))]
  pub async fn execute_workflow(&self, workflow_id: &str) -> Result<Workflow, OrchestratorError> {
    let (cancel, tasks) = self.begin(workflow_id)?;
    info!(tasks, "workflow_started");
    self.notifier.notify(WorkflowEvent::WorkflowStarted {
      workflow_id: workflow_id.to_string(),
    });

    let mut progress = Progress::default();
    loop {
      let (step, events) = self.plan_wave(workflow_id, &progress)?;
      self.emit(events);

      let wave = match step {
        Step::Dispatch(wave) => wave,
        Step::Done(workflow) => return Ok(workflow),
      };

      let mut in_flight: FuturesUnordered<_> = wave
        .into_iter()
        .map(|dispatch| self.run_task(dispatch, &cancel))
        .collect();
      while let Some(settled) = in_flight.next().await {
        let events = self.apply_outcome(workflow_id, settled, &mut progress)?;
        self.emit(events);
      }
    }
  }

  /// Snapshot of a workflow's current state.
  pub fn get_workflow_status(&self, workflow_id: &str) -> Result<Workflow, OrchestratorError> {
    self
      .workflows()
      .get(workflow_id)
      .map(|entry| entry.workflow.clone())
      .ok_or_else(|| OrchestratorError::WorkflowNotFound(workflow_id.to_string()))
  }

  /// Cancel a running workflow.
  ///
  /// Running tasks are marked `Revoked` and their backend handles are asked
  /// to stop; pending tasks are left as they are. Returns `false` when the
  /// workflow is unknown or not running.
  pub fn cancel_workflow(&self, workflow_id: &str) -> bool {
    let mut workflows = self.workflows();
    let Some(entry) = workflows.get_mut(workflow_id) else {
      return false;
    };
    if entry.workflow.status != WorkflowStatus::Running {
      return false;
    }

    let now = Utc::now();
    let mut revoked = 0usize;
    for task in entry.workflow.tasks.iter_mut() {
      if task.status == TaskStatus::Running {
        task.mark_revoked("workflow cancelled".to_string(), now);
        revoked += 1;
      }
    }
    entry.workflow.status = WorkflowStatus::Cancelled;
    entry.workflow.completed_at = Some(now);
    entry.cancel.cancel();
    drop(workflows);

    info!(workflow_id = %workflow_id, revoked, "workflow_cancelled");
    self.notifier.notify(WorkflowEvent::WorkflowCancelled {
      workflow_id: workflow_id.to_string(),
    });
    true
  }

  /// Remove a workflow that is not running and return its last snapshot.
  pub fn discard_workflow(&self, workflow_id: &str) -> Result<Workflow, OrchestratorError> {
    let mut workflows = self.workflows();
    match workflows.get(workflow_id) {
      None => Err(OrchestratorError::WorkflowNotFound(workflow_id.to_string())),
      Some(entry) if entry.workflow.status == WorkflowStatus::Running => Err(
        OrchestratorError::WorkflowAlreadyRunning(workflow_id.to_string()),
      ),
      Some(_) => workflows
        .remove(workflow_id)
        .map(|entry| entry.workflow)
        .ok_or_else(|| OrchestratorError::WorkflowNotFound(workflow_id.to_string())),
    }
  }

  /// Snapshots of every workflow, oldest first.
  pub fn list_workflows(&self) -> Vec<Workflow> {
    let mut snapshots: Vec<Workflow> = self
      .workflows()
      .values()
      .map(|entry| entry.workflow.clone())
      .collect();
    snapshots.sort_by(|a, b| {
      a.created_at
        .cmp(&b.created_at)
        .then_with(|| a.workflow_id.cmp(&b.workflow_id))
    });
    snapshots
  }

  fn workflows(&self) -> MutexGuard<'_, HashMap<String, WorkflowEntry>> {
    self.workflows.lock().unwrap_or_else(|e| e.into_inner())
  }

  fn emit(&self, events: Vec<WorkflowEvent>) {
    for event in events {
      self.notifier.notify(event);
    }
  }

  /// Move a pending workflow to `Running`.
  fn begin(&self, workflow_id: &str) -> Result<(CancellationToken, usize), OrchestratorError> {
    let mut workflows = self.workflows();
    let entry = workflows
      .get_mut(workflow_id)
      .ok_or_else(|| OrchestratorError::WorkflowNotFound(workflow_id.to_string()))?;

    if entry.workflow.is_terminal() {
      return Err(OrchestratorError::WorkflowAlreadyFinished {
        workflow_id: workflow_id.to_string(),
        status: entry.workflow.status,
      });
    }
    if entry.workflow.status == WorkflowStatus::Running {
      return Err(OrchestratorError::WorkflowAlreadyRunning(
        workflow_id.to_string(),
      ));
    }

    entry.workflow.status = WorkflowStatus::Running;
    entry.workflow.started_at = Some(Utc::now());
    Ok((entry.cancel.clone(), entry.workflow.tasks.len()))
  }

  /// Decide what happens next: dispatch the ready set, or finish.
  fn plan_wave(
    &self,
    workflow_id: &str,
    progress: &Progress,
  ) -> Result<(Step, Vec<WorkflowEvent>), OrchestratorError> {
    let mut workflows = self.workflows();
    let entry = workflows
      .get_mut(workflow_id)
      .ok_or_else(|| OrchestratorError::WorkflowNotFound(workflow_id.to_string()))?;
    let workflow = &mut entry.workflow;
    let mut events = Vec::new();

    // Cancelled from outside while the last wave was in flight.
    if workflow.status != WorkflowStatus::Running {
      return Ok((Step::Done(workflow.clone()), events));
    }

    if progress.settled() == workflow.tasks.len() {
      events.push(finish(workflow, progress));
      return Ok((Step::Done(workflow.clone()), events));
    }

    let ready: Vec<usize> = workflow
      .tasks
      .iter()
      .enumerate()
      .filter(|(_, task)| {
        task.status.is_dispatchable()
          && task
            .dependencies
            .iter()
            .all(|dep| progress.completed.contains(dep))
      })
      .map(|(i, _)| i)
      .collect();

    if ready.is_empty() {
      let message = stuck_error(workflow, progress);
      error!(error = %message, "workflow_stuck");
      workflow.status = WorkflowStatus::Failed;
      workflow.error = Some(message.clone());
      workflow.completed_at = Some(Utc::now());
      events.push(WorkflowEvent::WorkflowFailed {
        workflow_id: workflow_id.to_string(),
        error: message,
      });
      return Ok((Step::Done(workflow.clone()), events));
    }

    let now = Utc::now();
    let mut wave = Vec::with_capacity(ready.len());
    for i in ready {
      let task = &mut workflow.tasks[i];
      task.mark_running(now);
      let attempt = task.attempt();

      info!(
        task_id = %task.task_id,
        task_name = %task.task_name,
        attempt,
        "task_started"
      );
      events.push(WorkflowEvent::TaskStarted {
        workflow_id: workflow_id.to_string(),
        task_id: task.task_id.clone(),
        attempt,
      });
      wave.push(Dispatch {
        task_id: task.task_id.clone(),
        timeout: task.timeout(),
        request: TaskRequest {
          workflow_id: workflow_id.to_string(),
          task_id: task.task_id.clone(),
          task_name: task.task_name.clone(),
          args: task.args.clone(),
          attempt,
        },
      });
    }

    Ok((Step::Dispatch(wave), events))
  }

  /// Submit one task and wait for it, bounded by its timeout.
  async fn run_task(&self, dispatch: Dispatch, cancel: &CancellationToken) -> Settled {
    let Dispatch {
      task_id,
      timeout,
      request,
    } = dispatch;

    let outcome = match self.backend.submit(request, cancel.child_token()).await {
      Err(e) => DispatchOutcome::Rejected(e.to_string()),
      Ok(mut handle) => {
        let waited = tokio::select! {
          result = tokio::time::timeout(timeout, handle.wait()) => Some(result),
          _ = cancel.cancelled() => None,
        };

        match waited {
          Some(Ok(Ok(value))) => DispatchOutcome::Succeeded(value),
          Some(Ok(Err(TaskError::Revoked))) => DispatchOutcome::Revoked,
          Some(Ok(Err(e))) => DispatchOutcome::Failed(e.to_string()),
          Some(Err(_)) => {
            debug!(task_id = %task_id, handle_id = %handle.handle_id(), "revoking timed out task");
            self.backend.cancel(&handle);
            DispatchOutcome::TimedOut(timeout)
          }
          None => {
            debug!(task_id = %task_id, handle_id = %handle.handle_id(), "revoking cancelled task");
            self.backend.cancel(&handle);
            DispatchOutcome::Revoked
          }
        }
      }
    };

    Settled {
      task_id,
      outcome,
      at: Utc::now(),
    }
  }

  /// Record one settled task on the canonical workflow.
  fn apply_outcome(
    &self,
    workflow_id: &str,
    settled: Settled,
    progress: &mut Progress,
  ) -> Result<Vec<WorkflowEvent>, OrchestratorError> {
    let mut workflows = self.workflows();
    let entry = workflows
      .get_mut(workflow_id)
      .ok_or_else(|| OrchestratorError::WorkflowNotFound(workflow_id.to_string()))?;
    let mut events = Vec::new();

    // Cancellation already settled the tasks still in flight.
    if entry.workflow.status != WorkflowStatus::Running {
      return Ok(events);
    }

    let Settled {
      task_id,
      outcome,
      at,
    } = settled;
    let Some(task) = entry.workflow.get_task_mut(&task_id) else {
      return Ok(events);
    };

    match outcome {
      DispatchOutcome::Succeeded(value) => {
        info!(task_id = %task_id, attempt = task.attempt(), "task_completed");
        events.push(WorkflowEvent::TaskSucceeded {
          workflow_id: workflow_id.to_string(),
          task_id: task_id.clone(),
          result: value.clone(),
        });
        task.mark_succeeded(value, at);
        progress.completed.insert(task_id);
      }
      DispatchOutcome::Failed(message) => match task.record_failure(message.clone(), at) {
        FailureDisposition::Retry => {
          warn!(
            task_id = %task_id,
            retry_count = task.retry_count,
            max_retries = task.max_retries,
            error = %message,
            "task_retrying"
          );
          events.push(WorkflowEvent::TaskRetrying {
            workflow_id: workflow_id.to_string(),
            task_id,
            retry_count: task.retry_count,
            error: message,
          });
        }
        FailureDisposition::Exhausted => {
          error!(
            task_id = %task_id,
            retry_count = task.retry_count,
            error = %message,
            "task_failed"
          );
          events.push(WorkflowEvent::TaskFailed {
            workflow_id: workflow_id.to_string(),
            task_id: task_id.clone(),
            error: message,
          });
          progress.failed.insert(task_id);
        }
      },
      DispatchOutcome::TimedOut(timeout) => {
        let message = format!("timeout after {}s", timeout.as_secs_f64());
        error!(task_id = %task_id, timeout_ms = task.timeout_ms, "task_timed_out");
        task.mark_failed(message.clone(), at);
        events.push(WorkflowEvent::TaskFailed {
          workflow_id: workflow_id.to_string(),
          task_id: task_id.clone(),
          error: message,
        });
        progress.failed.insert(task_id);
      }
      DispatchOutcome::Rejected(message) => {
        error!(task_id = %task_id, error = %message, "task_failed");
        task.mark_failed(message.clone(), at);
        events.push(WorkflowEvent::TaskFailed {
          workflow_id: workflow_id.to_string(),
          task_id: task_id.clone(),
          error: message,
        });
        progress.failed.insert(task_id);
      }
      DispatchOutcome::Revoked => {
        let message = TaskError::Revoked.to_string();
        warn!(task_id = %task_id, error = %message, "task_failed");
        task.mark_revoked(message.clone(), at);
        events.push(WorkflowEvent::TaskFailed {
          workflow_id: workflow_id.to_string(),
          task_id: task_id.clone(),
          error: message,
        });
        progress.failed.insert(task_id);
      }
    }

    Ok(events)
  }
}

/// Settle a workflow whose tasks are all terminal.
fn finish(workflow: &mut Workflow, progress: &Progress) -> WorkflowEvent {
  let now = Utc::now();
  let duration_ms = workflow
    .started_at
    .map(|started| (now - started).num_milliseconds())
    .unwrap_or_default();
  workflow.completed_at = Some(now);

  if progress.failed.is_empty() {
    info!(duration_ms, "workflow_completed");
    workflow.status = WorkflowStatus::Completed;
    return WorkflowEvent::WorkflowCompleted {
      workflow_id: workflow.workflow_id.clone(),
    };
  }

  let failed: Vec<&str> = workflow
    .task_ids()
    .filter(|id| progress.failed.contains(*id))
    .collect();
  let message = format!("failed tasks: {}", failed.join(", "));

  error!(duration_ms, error = %message, "workflow_failed");
  workflow.status = WorkflowStatus::Failed;
  workflow.error = Some(message.clone());
  WorkflowEvent::WorkflowFailed {
    workflow_id: workflow.workflow_id.clone(),
    error: message,
  }
}

/// Describe why no task is ready: a cycle among the remaining tasks, or
/// failed tasks upstream of them.
fn stuck_error(workflow: &Workflow, progress: &Progress) -> String {
  let remaining: Vec<&str> = workflow
    .task_ids()
    .filter(|id| !progress.is_settled(id))
    .collect();
  let graph = workflow.graph();

  let cause = match graph.find_cycle(|id| remaining.iter().any(|r| *r == id)) {
    Some(cycle) => format!("dependency cycle: {}", cycle.join(" -> ")),
    None => {
      let mut upstream: HashSet<String> = HashSet::new();
      for id in &remaining {
        upstream.extend(graph.ancestors(id));
      }
      let blockers: Vec<&str> = workflow
        .task_ids()
        .filter(|id| progress.failed.contains(*id) && upstream.contains(*id))
        .collect();
      format!("blocked by failed upstream tasks: {}", blockers.join(", "))
    }
  };

  format!("stuck: {} ({cause})", remaining.join(", "))
}

#[cfg(test)]
mod tests {
  use super::*;
  use conductor_config::TaskDef;
  use conductor_workflow::TaskDefaults;

  fn workflow(tasks: Vec<TaskDef>) -> Workflow {
    let def = WorkflowDef::new("wf", "test", tasks);
    Workflow::from_def("wf", &def, &TaskDefaults::default(), |_| true).unwrap()
  }

  fn progress(completed: &[&str], failed: &[&str]) -> Progress {
    Progress {
      completed: completed.iter().map(|s| s.to_string()).collect(),
      failed: failed.iter().map(|s| s.to_string()).collect(),
    }
  }

  #[test]
  fn test_stuck_error_names_cycle() {
    let wf = workflow(vec![
      TaskDef::new("a", "noop").depends_on(["b"]),
      TaskDef::new("b", "noop").depends_on(["a"]),
    ]);

    assert_eq!(
      stuck_error(&wf, &Progress::default()),
      "stuck: a, b (dependency cycle: a -> b -> a)"
    );
  }

  #[test]
  fn test_stuck_error_names_failed_upstream() {
    let wf = workflow(vec![
      TaskDef::new("a", "noop"),
      TaskDef::new("b", "noop"),
      TaskDef::new("c", "noop").depends_on(["a"]),
      TaskDef::new("d", "noop").depends_on(["c"]),
    ]);

    assert_eq!(
      stuck_error(&wf, &progress(&["b"], &["a"])),
      "stuck: c, d (blocked by failed upstream tasks: a)"
    );
  }

  #[test]
  fn test_finish_lists_failed_tasks_in_definition_order() {
    let mut wf = workflow(vec![
      TaskDef::new("x", "noop"),
      TaskDef::new("y", "noop"),
      TaskDef::new("z", "noop"),
    ]);

    let event = finish(&mut wf, &progress(&["y"], &["z", "x"]));

    assert_eq!(wf.status, WorkflowStatus::Failed);
    assert_eq!(wf.error.as_deref(), Some("failed tasks: x, z"));
    assert!(wf.completed_at.is_some());
    assert!(matches!(event, WorkflowEvent::WorkflowFailed { .. }));
  }

  #[test]
  fn test_finish_without_failures_completes() {
    let mut wf = workflow(vec![TaskDef::new("x", "noop")]);

    let event = finish(&mut wf, &progress(&["x"], &[]));

    assert_eq!(wf.status, WorkflowStatus::Completed);
    assert_eq!(wf.error, None);
    assert_eq!(
      event,
      WorkflowEvent::WorkflowCompleted {
        workflow_id: "wf".to_string()
      }
    );
  }
}
