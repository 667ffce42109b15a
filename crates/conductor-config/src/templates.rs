//! Canned workflow definitions for common business flows.
//!
//! Templates only describe the task graph. The task functions they name must
//! be registered with the orchestrator before the definition is created.

use crate::{TaskDef, WorkflowDef};

/// Names accepted by [`by_name`].
pub const TEMPLATE_NAMES: &[&str] = &["user_onboarding", "service_creation", "order_processing"];

/// Look up a template by name, parameterised by the entity id it runs for.
pub fn by_name(name: &str, entity_id: &str) -> Option<WorkflowDef> {
  match name {
    "user_onboarding" => Some(user_onboarding(entity_id)),
    "service_creation" => Some(service_creation(entity_id)),
    "order_processing" => Some(order_processing(entity_id)),
    _ => None,
  }
}

/// Welcome email and profile creation run in parallel; the onboarding guide
/// goes out once both the email and notification setup are done.
pub fn user_onboarding(user_id: &str) -> WorkflowDef {
  WorkflowDef::new(
    format!("user_onboarding_{user_id}"),
    "User Onboarding",
    vec![
      step("send_welcome_email", &[], 60),
      step("create_user_profile", &[], 30),
      step("setup_notifications", &["create_user_profile"], 30),
      step(
        "send_onboarding_guide",
        &["send_welcome_email", "setup_notifications"],
        60,
      ),
    ],
  )
}

pub fn service_creation(service_id: &str) -> WorkflowDef {
  WorkflowDef::new(
    format!("service_creation_{service_id}"),
    "Service Creation",
    vec![
      step("validate_service", &[], 30),
      step("create_availability", &["validate_service"], 60),
      step("notify_admin", &["validate_service"], 30),
      step("index_for_search", &["create_availability"], 120),
    ],
  )
}

pub fn order_processing(order_id: &str) -> WorkflowDef {
  WorkflowDef::new(
    format!("order_processing_{order_id}"),
    "Order Processing",
    vec![
      step("validate_order", &[], 30),
      step("process_payment", &["validate_order"], 120),
      step("update_inventory", &["process_payment"], 60),
      step("send_confirmation", &["process_payment"], 30),
      step(
        "schedule_fulfillment",
        &["update_inventory", "send_confirmation"],
        30,
      ),
    ],
  )
}

// Template steps use the task name as the task id.
fn step(name: &str, dependencies: &[&str], timeout_secs: u64) -> TaskDef {
  TaskDef::new(name, name)
    .depends_on(dependencies.iter().copied())
    .with_timeout_ms(timeout_secs * 1000)
}
