//! Conductor Config
//!
//! This crate contains the serializable workflow definition types for conductor.
//! These types describe a workflow before it is validated against the task
//! registry and turned into a schedulable workflow by the orchestrator.
//!
//! Definitions can be loaded from:
//! - JSON files (via CLI with `conductor run workflow.json`)
//! - The canned [`templates`] shipped with this crate

mod task;
pub mod templates;
mod workflow;

pub use task::TaskDef;
pub use workflow::WorkflowDef;
