//! Integration tests for wave scheduling, retries, timeouts and stuck detection.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use conductor_config::{TaskDef, WorkflowDef};
use conductor_orchestrator::{
  OrchestratorConfig, TaskError, TaskStatus, WorkflowOrchestrator, WorkflowStatus,
};
use serde_json::{Value, json};
use tokio::sync::Barrier;

fn orchestrator() -> WorkflowOrchestrator {
  let orchestrator = WorkflowOrchestrator::new(OrchestratorConfig::default());
  orchestrator.register_task("noop", |_ctx| async { Ok(Value::Null) });
  orchestrator.register_task("echo", |ctx| async move { Ok(ctx.args) });
  orchestrator.register_task("fail", |ctx| async move {
    let message = ctx.args["message"].as_str().unwrap_or("failed").to_string();
    Err(TaskError::failed(message))
  });
  orchestrator.register_task("hang", |_ctx| async {
    tokio::time::sleep(Duration::from_secs(30)).await;
    Ok(Value::Null)
  });
  orchestrator
}

async fn run(orchestrator: &WorkflowOrchestrator, def: WorkflowDef) -> conductor_orchestrator::Workflow {
  let id = orchestrator.create_workflow(&def).unwrap().workflow_id;
  orchestrator.execute_workflow(&id).await.unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_fan_out_runs_siblings_in_the_same_wave() {
  let orchestrator = orchestrator();

  // b and c can only finish if they run at the same time.
  let barrier = Arc::new(Barrier::new(2));
  orchestrator.register_task("rendezvous", move |_ctx| {
    let barrier = barrier.clone();
    async move {
      barrier.wait().await;
      Ok(json!("met"))
    }
  });

  let def = WorkflowDef::new(
    "fan-out",
    "Fan out",
    vec![
      TaskDef::new("a", "noop"),
      TaskDef::new("b", "rendezvous")
        .depends_on(["a"])
        .with_timeout_ms(2_000),
      TaskDef::new("c", "rendezvous")
        .depends_on(["a"])
        .with_timeout_ms(2_000),
    ],
  );

  let wf = run(&orchestrator, def).await;

  assert_eq!(wf.status, WorkflowStatus::Completed);
  assert_eq!(wf.error, None);
  assert!(wf.started_at.is_some());
  assert!(wf.completed_at.is_some());

  let a = wf.get_task("a").unwrap();
  for id in ["b", "c"] {
    let task = wf.get_task(id).unwrap();
    assert_eq!(task.status, TaskStatus::Success);
    assert_eq!(task.result, Some(json!("met")));
    assert!(task.started_at.unwrap() > a.completed_at.unwrap());
  }
}

#[tokio::test]
async fn test_dependencies_finish_before_dependents_start() {
  let orchestrator = orchestrator();
  let def = WorkflowDef::new(
    "chain",
    "Chain",
    vec![
      TaskDef::new("d", "noop").depends_on(["b", "c"]),
      TaskDef::new("b", "noop").depends_on(["a"]),
      TaskDef::new("c", "noop").depends_on(["a"]),
      TaskDef::new("a", "noop"),
    ],
  );

  let wf = run(&orchestrator, def).await;

  assert_eq!(wf.status, WorkflowStatus::Completed);
  for task in &wf.tasks {
    let started = task.started_at.unwrap();
    for dep in &task.dependencies {
      let upstream = wf.get_task(dep).unwrap();
      assert!(
        started > upstream.completed_at.unwrap(),
        "{} started before {} completed",
        task.task_id,
        dep
      );
    }
  }
}

#[tokio::test]
async fn test_cycle_fails_as_stuck() {
  let orchestrator = orchestrator();
  let def = WorkflowDef::new(
    "cycle",
    "Cycle",
    vec![
      TaskDef::new("A", "noop").depends_on(["B"]),
      TaskDef::new("B", "noop").depends_on(["A"]),
    ],
  );

  let wf = run(&orchestrator, def).await;

  assert_eq!(wf.status, WorkflowStatus::Failed);
  let error = wf.error.unwrap();
  assert!(error.starts_with("stuck: A, B"), "unexpected error: {error}");
  assert!(error.contains("dependency cycle: A -> B -> A"));
  assert!(wf.tasks.iter().all(|t| t.status == TaskStatus::Pending));
  assert!(wf.completed_at.is_some());
}

#[tokio::test]
async fn test_cycle_behind_successful_tasks_is_detected() {
  let orchestrator = orchestrator();
  let def = WorkflowDef::new(
    "late-cycle",
    "Late cycle",
    vec![
      TaskDef::new("root", "noop"),
      TaskDef::new("x", "noop").depends_on(["root", "y"]),
      TaskDef::new("y", "noop").depends_on(["x"]),
    ],
  );

  let wf = run(&orchestrator, def).await;

  assert_eq!(wf.status, WorkflowStatus::Failed);
  assert_eq!(wf.get_task("root").unwrap().status, TaskStatus::Success);
  assert_eq!(
    wf.error.as_deref(),
    Some("stuck: x, y (dependency cycle: x -> y -> x)")
  );
}

#[tokio::test]
async fn test_flaky_task_succeeds_within_retry_budget() {
  let orchestrator = orchestrator();
  let calls = Arc::new(AtomicU32::new(0));
  let counter = calls.clone();
  orchestrator.register_task("flaky", move |ctx| {
    let counter = counter.clone();
    async move {
      let call = counter.fetch_add(1, Ordering::SeqCst) + 1;
      assert_eq!(ctx.attempt, call);
      if call <= 2 {
        Err(TaskError::failed(format!("attempt {call} failed")))
      } else {
        Ok(json!({ "attempt": call }))
      }
    }
  });

  let def = WorkflowDef::new(
    "flaky",
    "Flaky",
    vec![
      TaskDef::new("A", "flaky").with_max_retries(2),
      TaskDef::new("B", "noop").depends_on(["A"]),
    ],
  );

  let wf = run(&orchestrator, def).await;

  let a = wf.get_task("A").unwrap();
  assert_eq!(a.status, TaskStatus::Success);
  assert_eq!(a.retry_count, 2);
  assert_eq!(a.error, None);
  assert_eq!(a.result, Some(json!({ "attempt": 3 })));
  assert_eq!(calls.load(Ordering::SeqCst), 3);
  assert_eq!(wf.status, WorkflowStatus::Completed);
}

#[tokio::test]
async fn test_retries_are_bounded() {
  let orchestrator = orchestrator();
  let calls = Arc::new(AtomicU32::new(0));
  let counter = calls.clone();
  orchestrator.register_task("always-fails", move |_ctx| {
    counter.fetch_add(1, Ordering::SeqCst);
    async { Err(TaskError::failed("still broken")) }
  });

  let def = WorkflowDef::new(
    "bounded",
    "Bounded",
    vec![TaskDef::new("A", "always-fails").with_max_retries(2)],
  );

  let wf = run(&orchestrator, def).await;

  let a = wf.get_task("A").unwrap();
  assert_eq!(a.status, TaskStatus::Failure);
  assert_eq!(a.retry_count, a.max_retries);
  assert_eq!(a.error.as_deref(), Some("still broken"));
  assert_eq!(calls.load(Ordering::SeqCst), 3);
  assert_eq!(wf.status, WorkflowStatus::Failed);
  assert_eq!(wf.error.as_deref(), Some("failed tasks: A"));
}

#[tokio::test]
async fn test_timeout_fails_without_consuming_retries() {
  let orchestrator = orchestrator();
  let def = WorkflowDef::new(
    "slow",
    "Slow",
    vec![TaskDef::new("A", "hang").with_timeout_ms(200)],
  );

  let wf = run(&orchestrator, def).await;

  let a = wf.get_task("A").unwrap();
  assert_eq!(a.status, TaskStatus::Failure);
  assert_eq!(a.retry_count, 0);
  assert_eq!(a.max_retries, 3);
  assert_eq!(a.error.as_deref(), Some("timeout after 0.2s"));
  assert_eq!(wf.status, WorkflowStatus::Failed);
}

#[tokio::test]
async fn test_any_failure_fails_the_workflow() {
  let orchestrator = orchestrator();
  let def = WorkflowDef::new(
    "mixed",
    "Mixed",
    vec![
      TaskDef::new("ok-1", "noop"),
      TaskDef::new("bad", "fail")
        .with_args(json!({ "message": "disk full" }))
        .with_max_retries(0),
      TaskDef::new("ok-2", "noop"),
    ],
  );

  let wf = run(&orchestrator, def).await;

  assert_eq!(wf.get_task("ok-1").unwrap().status, TaskStatus::Success);
  assert_eq!(wf.get_task("ok-2").unwrap().status, TaskStatus::Success);
  assert_eq!(wf.get_task("bad").unwrap().error.as_deref(), Some("disk full"));
  assert_eq!(wf.status, WorkflowStatus::Failed);
  assert_eq!(wf.error.as_deref(), Some("failed tasks: bad"));
}

#[tokio::test]
async fn test_failed_upstream_leaves_dependents_stuck() {
  let orchestrator = orchestrator();
  let def = WorkflowDef::new(
    "blocked",
    "Blocked",
    vec![
      TaskDef::new("a", "fail").with_max_retries(0),
      TaskDef::new("b", "noop").depends_on(["a"]),
      TaskDef::new("c", "noop").depends_on(["b"]),
    ],
  );

  let wf = run(&orchestrator, def).await;

  assert_eq!(wf.status, WorkflowStatus::Failed);
  assert_eq!(
    wf.error.as_deref(),
    Some("stuck: b, c (blocked by failed upstream tasks: a)")
  );
  assert_eq!(wf.get_task("b").unwrap().status, TaskStatus::Pending);
  assert_eq!(wf.get_task("c").unwrap().started_at, None);
}

#[tokio::test]
async fn test_args_and_defaults_reach_the_task() {
  let config = OrchestratorConfig {
    default_max_retries: 1,
    default_timeout_ms: 5_000,
  };
  let orchestrator = WorkflowOrchestrator::new(config);
  orchestrator.register_task("inspect", |ctx| async move {
    Ok(json!({
      "workflow_id": ctx.workflow_id,
      "task_id": ctx.task_id,
      "task_name": ctx.task_name,
      "args": ctx.args,
    }))
  });

  let def = WorkflowDef::new(
    "args",
    "Args",
    vec![TaskDef::new("look", "inspect").with_args(json!({ "n": 7 }))],
  );
  let wf = run(&orchestrator, def).await;

  let task = wf.get_task("look").unwrap();
  assert_eq!(task.max_retries, 1);
  assert_eq!(task.timeout_ms, 5_000);
  assert_eq!(
    task.result,
    Some(json!({
      "workflow_id": "args",
      "task_id": "look",
      "task_name": "inspect",
      "args": { "n": 7 },
    }))
  );
}

#[tokio::test]
async fn test_panicking_task_is_recorded_as_failure() {
  let orchestrator = orchestrator();
  orchestrator.register_task("explode", |_ctx| async {
    if true {
      panic!("kaboom");
    }
    Ok(Value::Null)
  });

  let def = WorkflowDef::new(
    "panic",
    "Panic",
    vec![TaskDef::new("A", "explode").with_max_retries(1)],
  );
  let wf = run(&orchestrator, def).await;

  let a = wf.get_task("A").unwrap();
  assert_eq!(a.status, TaskStatus::Failure);
  assert_eq!(a.retry_count, 1);
  assert!(a.error.as_deref().unwrap().contains("kaboom"));
  assert_eq!(wf.status, WorkflowStatus::Failed);
}

#[tokio::test]
async fn test_task_reporting_revoked_counts_as_failed() {
  let orchestrator = orchestrator();
  orchestrator.register_task("revoked", |_ctx| async { Err(TaskError::Revoked) });

  let def = WorkflowDef::new(
    "revoked",
    "Revoked",
    vec![
      TaskDef::new("A", "revoked"),
      TaskDef::new("B", "noop"),
    ],
  );
  let wf = run(&orchestrator, def).await;

  let a = wf.get_task("A").unwrap();
  assert_eq!(a.status, TaskStatus::Revoked);
  assert_eq!(a.error.as_deref(), Some(TaskError::Revoked.to_string().as_str()));
  assert_eq!(a.retry_count, 0);
  assert_eq!(wf.status, WorkflowStatus::Failed);
  assert_eq!(wf.error.as_deref(), Some("failed tasks: A"));
}

#[tokio::test]
async fn test_empty_workflow_completes() {
  let orchestrator = orchestrator();
  let wf = run(&orchestrator, WorkflowDef::new("empty", "Empty", vec![])).await;

  assert_eq!(wf.status, WorkflowStatus::Completed);
  assert!(wf.completed_at.is_some());
}

#[tokio::test]
async fn test_status_queries_are_idempotent() {
  let orchestrator = orchestrator();
  let def = WorkflowDef::new(
    "steady",
    "Steady",
    vec![TaskDef::new("a", "echo").with_args(json!([1, 2, 3]))],
  );
  let finished = run(&orchestrator, def).await;

  let first = orchestrator.get_workflow_status("steady").unwrap();
  let second = orchestrator.get_workflow_status("steady").unwrap();

  assert_eq!(first, second);
  assert_eq!(first, finished);
  assert_eq!(first.get_task("a").unwrap().result, Some(json!([1, 2, 3])));
}
