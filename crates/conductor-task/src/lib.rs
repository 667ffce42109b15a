//! Task execution for conductor workflows.
//!
//! This crate provides:
//! - [`TaskRegistry`], the process-wide map from task name to task function
//! - [`TaskExecutionBackend`], the submit/poll/cancel contract the orchestrator
//!   dispatches through, and the [`TaskHandle`] a submission returns
//! - [`InProcessBackend`], which runs registered task functions on the tokio
//!   runtime
//!
//! Task functions are opaque units of work: they receive a [`TaskContext`] and
//! resolve to a JSON result or a [`TaskError`].

mod backend;
mod error;
mod in_process;
mod registry;

pub use backend::{TaskExecutionBackend, TaskHandle, TaskPoll, TaskRequest};
pub use error::{BackendError, TaskError};
pub use in_process::InProcessBackend;
pub use registry::{TaskContext, TaskFn, TaskOutcome, TaskRegistry};
