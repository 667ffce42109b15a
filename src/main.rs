mod builtin;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

use conductor_config::{WorkflowDef, templates};
use conductor_orchestrator::{OrchestratorConfig, WorkflowOrchestrator, WorkflowStatus};

/// Conductor - a dependency-aware workflow orchestrator
#[derive(Parser)]
#[command(name = "conductor")]
#[command(version, about, long_about = None)]
struct Cli {
  /// Log level used when RUST_LOG is not set
  #[arg(long, global = true, default_value = "info")]
  log_level: String,

  /// Emit logs as JSON
  #[arg(long, global = true)]
  json: bool,

  /// Path to an orchestrator config file (JSON)
  #[arg(long, global = true)]
  config: Option<PathBuf>,

  #[command(subcommand)]
  command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
  /// Create and execute a workflow, printing the final snapshot
  Run {
    /// Path to the workflow file (JSON)
    workflow_file: PathBuf,
  },

  /// Check a workflow definition without executing it
  Validate {
    /// Path to the workflow file (JSON)
    workflow_file: PathBuf,
  },

  /// Print a built-in workflow template
  Template {
    /// One of: user_onboarding, service_creation, order_processing
    name: String,

    /// Entity the workflow runs for (user, service or order id)
    entity_id: String,
  },

  /// List the built-in task names
  Tasks,
}

fn main() -> Result<()> {
  let cli = Cli::parse();
  init_tracing(&cli.log_level, cli.json);

  match cli.command {
    Some(Commands::Run { workflow_file }) => {
      let config = load_config(cli.config.as_deref())?;
      run_workflow(workflow_file, config)?;
    }
    Some(Commands::Validate { workflow_file }) => {
      let config = load_config(cli.config.as_deref())?;
      validate_workflow(&workflow_file, config)?;
    }
    Some(Commands::Template { name, entity_id }) => {
      let def = templates::by_name(&name, &entity_id).with_context(|| {
        format!(
          "unknown template '{}' (expected one of: {})",
          name,
          templates::TEMPLATE_NAMES.join(", ")
        )
      })?;
      println!("{}", serde_json::to_string_pretty(&def)?);
    }
    Some(Commands::Tasks) => {
      for name in builtin::NAMES {
        println!("{name}");
      }
    }
    None => {
      println!("conductor - use --help to see available commands");
    }
  }

  Ok(())
}

/// Logs go to stderr so stdout carries only workflow output.
fn init_tracing(level: &str, json: bool) {
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
  let registry = tracing_subscriber::registry().with(filter);

  if json {
    registry
      .with(fmt::layer().json().with_writer(std::io::stderr))
      .init();
  } else {
    registry
      .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
      .init();
  }
}

fn load_config(path: Option<&Path>) -> Result<OrchestratorConfig> {
  let Some(path) = path else {
    return Ok(OrchestratorConfig::default());
  };

  let content = std::fs::read_to_string(path)
    .with_context(|| format!("failed to read config file: {}", path.display()))?;
  serde_json::from_str(&content)
    .with_context(|| format!("failed to parse config file: {}", path.display()))
}

fn read_workflow_def(workflow_file: &Path) -> Result<WorkflowDef> {
  let content = std::fs::read_to_string(workflow_file)
    .with_context(|| format!("failed to read workflow file: {}", workflow_file.display()))?;

  serde_json::from_str(&content)
    .with_context(|| format!("failed to parse workflow file: {}", workflow_file.display()))
}

fn orchestrator(config: OrchestratorConfig) -> WorkflowOrchestrator {
  let orchestrator = WorkflowOrchestrator::new(config);
  builtin::register(orchestrator.registry());
  orchestrator
}

fn run_workflow(workflow_file: PathBuf, config: OrchestratorConfig) -> Result<()> {
  let rt = tokio::runtime::Runtime::new()?;
  rt.block_on(async { run_workflow_async(workflow_file, config).await })
}

async fn run_workflow_async(workflow_file: PathBuf, config: OrchestratorConfig) -> Result<()> {
  let def = read_workflow_def(&workflow_file)?;
  let orchestrator = Arc::new(orchestrator(config));

  let created = orchestrator
    .create_workflow(&def)
    .context("failed to create workflow")?;
  let workflow_id = created.workflow_id.clone();

  // Ctrl-C cancels the workflow; execution then returns the cancelled snapshot.
  let interrupt = {
    let orchestrator = Arc::clone(&orchestrator);
    let workflow_id = workflow_id.clone();
    tokio::spawn(async move {
      if tokio::signal::ctrl_c().await.is_ok() {
        tracing::warn!(workflow_id = %workflow_id, "interrupt received, cancelling workflow");
        orchestrator.cancel_workflow(&workflow_id);
      }
    })
  };

  let result = orchestrator.execute_workflow(&workflow_id).await;
  interrupt.abort();
  let workflow = result.context("workflow execution failed")?;

  println!("{}", serde_json::to_string_pretty(&workflow)?);

  if workflow.status != WorkflowStatus::Completed {
    bail!(
      "workflow {} finished with status {}{}",
      workflow.workflow_id,
      workflow.status,
      workflow
        .error
        .as_deref()
        .map(|e| format!(": {e}"))
        .unwrap_or_default()
    );
  }
  Ok(())
}

fn validate_workflow(workflow_file: &Path, config: OrchestratorConfig) -> Result<()> {
  let def = read_workflow_def(workflow_file)?;
  let workflow = orchestrator(config)
    .create_workflow(&def)
    .context("workflow definition is invalid")?;

  let graph = workflow.graph();
  if let Some(cycle) = graph.find_cycle(|_| true) {
    bail!(
      "workflow {} contains a dependency cycle: {}",
      workflow.workflow_id,
      cycle.join(" -> ")
    );
  }

  println!(
    "workflow {} is valid ({} tasks, entry points: {})",
    workflow.workflow_id,
    workflow.tasks.len(),
    graph.entry_points().join(", ")
  );
  Ok(())
}
