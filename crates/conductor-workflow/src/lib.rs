//! Conductor Workflow
//!
//! This crate provides the schedulable workflow representation for conductor.
//! A [`Workflow`] is built from a [`WorkflowDef`](conductor_config::WorkflowDef)
//! once the definition has been validated:
//! - Task ids are unique and non-empty
//! - Every dependency names a task in the same workflow
//! - No task depends on itself
//! - Every task name resolves to a registered task function
//!
//! Cycles are not rejected here. They surface as a stuck workflow when the
//! orchestrator finds no ready task, and [`Graph::find_cycle`] names them.

mod error;
mod graph;
mod node;
mod status;
mod workflow;

pub use error::WorkflowError;
pub use graph::Graph;
pub use node::{FailureDisposition, TaskNode};
pub use status::{TaskStatus, WorkflowStatus};
pub use workflow::{TaskDefaults, Workflow};
