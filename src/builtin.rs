//! Built-in tasks available to workflows run from the command line.

use std::time::Duration;

use conductor_task::{TaskContext, TaskError, TaskOutcome, TaskRegistry};
use serde_json::{Value, json};

/// Names of the built-in tasks, in the order `conductor tasks` lists them.
pub const NAMES: &[&str] = &["noop", "echo", "sleep", "fail"];

/// Register every built-in task.
pub fn register(registry: &TaskRegistry) {
  registry.register("noop", |_ctx| async { Ok(Value::Null) });
  registry.register("echo", |ctx| async move { Ok(ctx.args) });
  registry.register("sleep", sleep);
  registry.register("fail", fail);
}

/// Sleeps for `args.ms` milliseconds, returning early if revoked.
async fn sleep(ctx: TaskContext) -> TaskOutcome {
  let ms = ctx.args["ms"]
    .as_u64()
    .ok_or_else(|| TaskError::failed("sleep requires an integer `ms` argument"))?;

  tokio::select! {
    _ = tokio::time::sleep(Duration::from_millis(ms)) => Ok(json!({ "slept_ms": ms })),
    _ = ctx.cancel.cancelled() => Err(TaskError::Revoked),
  }
}

/// Always fails with `args.message`.
async fn fail(ctx: TaskContext) -> TaskOutcome {
  let message = ctx.args["message"].as_str().unwrap_or("task failed");
  Err(TaskError::failed(message))
}
