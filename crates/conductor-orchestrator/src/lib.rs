//! Conductor Orchestrator
//!
//! This crate provides the [`WorkflowOrchestrator`], the scheduler that turns
//! workflow definitions into running task graphs.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    WorkflowOrchestrator                     │
//! │  - create_workflow(def) → validated, pending Workflow       │
//! │  - execute_workflow(id) → wave loop until terminal          │
//! │  - get_workflow_status / cancel_workflow / discard_workflow │
//! └─────────────────────────────────────────────────────────────┘
//!                               │ submit / poll / cancel
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  TaskExecutionBackend                       │
//! │  - InProcessBackend: registered task fns on tokio           │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Each iteration of the loop computes the ready set (dispatchable tasks whose
//! dependencies all succeeded), dispatches it concurrently and waits for every
//! member, each bounded by its own timeout, before computing the next wave.
//!
//! # Usage
//!
//! ```ignore
//! use conductor_config::{TaskDef, WorkflowDef};
//! use conductor_orchestrator::{OrchestratorConfig, WorkflowOrchestrator};
//!
//! let orchestrator = WorkflowOrchestrator::new(OrchestratorConfig::default());
//! orchestrator.register_task("fetch", |ctx| async move { Ok(ctx.args) });
//!
//! let def = WorkflowDef::new("wf-1", "Fetch", vec![TaskDef::new("a", "fetch")]);
//! orchestrator.create_workflow(&def)?;
//! let workflow = orchestrator.execute_workflow("wf-1").await?;
//! ```

mod config;
mod error;
mod events;
mod orchestrator;

pub use config::OrchestratorConfig;
pub use error::OrchestratorError;
pub use events::{ChannelNotifier, NoopNotifier, WorkflowEvent, WorkflowNotifier};
pub use orchestrator::WorkflowOrchestrator;

pub use conductor_task::{TaskContext, TaskError, TaskExecutionBackend, TaskRegistry};
pub use conductor_workflow::{TaskNode, TaskStatus, Workflow, WorkflowStatus};
