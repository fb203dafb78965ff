//! Taskgate command line
//!
//! Routes or runs a single task file against a router document and prints
//! the outcome as JSON.

use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::process;
use taskgate::observability::init_default_logging;
use taskgate::policy::{DiffSummary, Evidence};
use taskgate::runner::RunOptions;
use taskgate::{GateConfig, GateError, GateResult, TaskRunner};
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "taskgate")]
#[command(about = "Declarative task routing and policy gating")]
#[command(version)]
struct Cli {
    /// Configuration file path (TOML or YAML)
    #[arg(short, long, value_name = "FILE", env = "TASKGATE_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the routing decision for a task
    Route {
        /// Task JSON file
        #[arg(long, value_name = "FILE")]
        task: PathBuf,
    },
    /// Route, gate and report on a task
    Run {
        /// Task JSON file
        #[arg(long, value_name = "FILE")]
        task: PathBuf,

        /// Plan JSON file evaluated instead of the task's own plan
        #[arg(long, value_name = "FILE")]
        plan: Option<PathBuf>,

        /// Diff summary JSON file (`summary`, `files`)
        #[arg(long, value_name = "FILE")]
        diff: Option<PathBuf>,

        /// Evidence JSON file (`tests`, `lint`, `logs`)
        #[arg(long, value_name = "FILE")]
        evidence: Option<PathBuf>,

        #[arg(long)]
        skip_policy: bool,

        #[arg(long)]
        manual_approval: bool,
    },
    /// Load the router document and summarize it
    Check,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_default_logging();

    let config = match load_configuration(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e.sanitized_message());
            process::exit(1);
        }
    };

    let runner = TaskRunner::from_config(&config);

    let result = match cli.command {
        Commands::Route { task } => route(&runner, &task),
        Commands::Run {
            task,
            plan,
            diff,
            evidence,
            skip_policy,
            manual_approval,
        } => {
            let options = match run_options(plan, diff, evidence, skip_policy, manual_approval) {
                Ok(options) => options,
                Err(e) => {
                    error!("Invalid run options: {}", e.sanitized_message());
                    process::exit(1);
                }
            };
            run(&runner, &task, options).await
        }
        Commands::Check => check(&runner),
    };

    match result {
        Ok(output) => println!("{output:#}"),
        Err(e) => {
            error!("Command failed: {}", e.sanitized_message());
            process::exit(1);
        }
    }
}

fn load_configuration(path: Option<&Path>) -> GateResult<GateConfig> {
    match path {
        Some(path) => {
            info!("Loading configuration from: {}", path.display());
            Ok(GateConfig::load_from_file(path)?)
        }
        None => {
            for candidate in ["taskgate.toml", "taskgate.yaml", "config/taskgate.toml"] {
                let candidate = Path::new(candidate);
                if candidate.exists() {
                    info!("Loading configuration from: {}", candidate.display());
                    return Ok(GateConfig::load_from_file(candidate)?);
                }
            }
            info!("No configuration file found, using defaults and environment");
            Ok(GateConfig::from_env()?)
        }
    }
}

fn read_json(path: &Path) -> GateResult<Value> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        GateError::invalid_input(format!("Failed to read {}: {e}", path.display()))
    })?;
    serde_json::from_str(&content)
        .map_err(|e| GateError::invalid_input(format!("Invalid JSON in {}: {e}", path.display())))
}

fn read_typed<T: serde::de::DeserializeOwned>(path: &Path) -> GateResult<T> {
    serde_json::from_value(read_json(path)?)
        .map_err(|e| GateError::invalid_input(format!("Unexpected shape in {}: {e}", path.display())))
}

fn run_options(
    plan: Option<PathBuf>,
    diff: Option<PathBuf>,
    evidence: Option<PathBuf>,
    skip_policy: bool,
    manual_approval: bool,
) -> GateResult<RunOptions> {
    let mut options = RunOptions::new();
    if let Some(path) = plan {
        options = options.with_plan(read_json(&path)?);
    }
    if let Some(path) = diff {
        options = options.with_diff(read_typed::<DiffSummary>(&path)?);
    }
    if let Some(path) = evidence {
        options = options.with_evidence(read_typed::<Evidence>(&path)?);
    }
    if skip_policy {
        options = options.skip_policy();
    }
    if manual_approval {
        options = options.with_manual_approval();
    }
    Ok(options)
}

fn route(runner: &TaskRunner, task_path: &Path) -> GateResult<Value> {
    let input = read_json(task_path)?;
    let decision = runner.route_task(&input.into())?;
    serde_json::to_value(decision).map_err(|e| GateError::internal(e.to_string()))
}

async fn run(runner: &TaskRunner, task_path: &Path, options: RunOptions) -> GateResult<Value> {
    let input = read_json(task_path)?;
    let outcome = runner.run(&input, options).await?;
    serde_json::to_value(outcome).map_err(|e| GateError::internal(e.to_string()))
}

fn check(runner: &TaskRunner) -> GateResult<Value> {
    let document = runner.router().load_config(true)?;
    Ok(json!({
        "config_path": runner.router().config_path().map(|p| p.display().to_string()),
        "routes": document.routes.len(),
        "fallbacks": document.fallbacks.len(),
        "budgets": document.budgets.len(),
        "budget_names": document.budgets.keys().collect::<Vec<_>>(),
        "policies": runner.policy_gate().policy_names(),
    }))
}
