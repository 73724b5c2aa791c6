//! `flowrun` CLI entry-point.
//!
//! Available sub-commands:
//! - `validate`: check a workflow JSON file's graph structure.
//! - `run`: execute a workflow JSON file with the built-in executors.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use engine::{EventBus, ExecutorConfig, NodeEvent, Workflow, WorkflowExecutor};
use nodes::builtin::{self, Passthrough};

#[derive(Parser)]
#[command(name = "flowrun", about = "Run node-and-connection automation workflows", version)]
struct Cli {
    /// Log filter, e.g. `debug` or `engine=trace`. `RUST_LOG` takes precedence.
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Validate a workflow definition JSON file.
    Validate {
        /// Path to the workflow JSON file.
        path: PathBuf,
    },
    /// Execute a workflow definition JSON file.
    Run {
        /// Path to the workflow JSON file.
        path: PathBuf,
        /// JSON object whose entries seed the execution context.
        #[arg(long)]
        seed: Option<PathBuf>,
        /// TOML executor configuration.
        #[arg(long, env = "FLOWRUN_CONFIG")]
        config: Option<PathBuf>,
        /// Bind every node type in the definition to the passthrough executor.
        #[arg(long)]
        dry_run: bool,
        /// Print node events to stderr as JSON lines.
        #[arg(long)]
        events: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cli.log_level))
        .context("invalid log filter")?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Validate { path } => validate(&path),
        Command::Run {
            path,
            seed,
            config,
            dry_run,
            events,
        } => run(&path, seed.as_deref(), config.as_deref(), dry_run, events).await,
    }
}

fn load_workflow(path: &Path) -> Result<Workflow> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read file {}", path.display()))?;
    Workflow::from_json(&content).with_context(|| format!("cannot parse {}", path.display()))
}

fn validate(path: &Path) -> Result<()> {
    let workflow = load_workflow(path)?;

    match engine::validate_dag(&workflow) {
        Ok(dag) => {
            println!("✅ Workflow is valid. Execution order: {:?}", dag.order());
            Ok(())
        }
        Err(e) => {
            eprintln!("❌ Validation failed: {e}");
            std::process::exit(1);
        }
    }
}

async fn run(
    path: &Path,
    seed: Option<&Path>,
    config: Option<&Path>,
    dry_run: bool,
    print_events: bool,
) -> Result<()> {
    let workflow = load_workflow(path)?;
    let config = match config {
        Some(p) => ExecutorConfig::load(p)?,
        None => ExecutorConfig::default(),
    };
    let seed = match seed {
        Some(p) => load_seed(p)?,
        None => HashMap::new(),
    };

    let mut registry = builtin::registry()?;
    if dry_run {
        for node in &workflow.nodes {
            if !registry.contains(&node.node_type) {
                debug!(node_type = %node.node_type, "dry run: binding to passthrough");
                registry.register(node.node_type.clone(), Arc::new(Passthrough))?;
            }
        }
    }

    let bus = Arc::new(EventBus::new());
    if print_events {
        bus.subscribe(
            None,
            Arc::new(|event: &NodeEvent| -> anyhow::Result<()> {
                eprintln!("{}", serde_json::to_string(event)?);
                Ok(())
            }),
        );
    }

    let executor = WorkflowExecutor::new(Arc::new(registry), config).with_events(bus);
    info!(workflow = %workflow.name, "starting run");

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c.cancel();
        }
    });

    let output = executor.run_with_cancel(&workflow, seed, cancel).await?;
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn load_seed(path: &Path) -> Result<HashMap<String, Value>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read seed file {}", path.display()))?;
    match serde_json::from_str::<Value>(&content)? {
        Value::Object(map) => Ok(map.into_iter().collect()),
        other => bail!("seed file must hold a JSON object, found {other}"),
    }
}
