//! locus simulator
//!
//! Runs one job against a simulated cluster and prints the job report.

use anyhow::{bail, Context};
use clap::Parser;
use locus_core::{ClusterConfig, JobSpec, LogFormat, NodeInfo, SchedulerConfig};
use locus_runtime::simulated::SimulatedRuntimeConfig;
use locus_runtime::SimulatedRuntime;
use locus_scheduler::{JobController, NodeRegistry, TaskScheduler};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// locus-sim - place and run a job on a simulated cluster
#[derive(Parser, Debug)]
#[command(name = "locus-sim")]
#[command(version, about, long_about = None)]
struct Args {
    /// Cluster configuration file (TOML)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Extra node as HOST:MAX_WORKERS (repeatable)
    #[arg(long = "node", value_parser = parse_node)]
    nodes: Vec<NodeInfo>,

    /// Run every task on its input's host
    #[arg(long)]
    force_local: bool,

    /// Never run a task on its input's host
    #[arg(long)]
    force_remote: bool,

    /// Maximum concurrently running tasks for the job
    #[arg(long)]
    max_cores: Option<u32>,

    /// Node failures tolerated per task
    #[arg(long)]
    max_attempts: Option<u32>,

    /// Log level (overrides the config file)
    #[arg(long)]
    log_level: Option<String>,

    /// Job name
    #[arg(long, default_value = "sim")]
    name: String,

    /// Input locators, one task each
    #[arg(required = true)]
    inputs: Vec<String>,
}

fn parse_node(s: &str) -> Result<NodeInfo, String> {
    let (host, workers) = s
        .rsplit_once(':')
        .ok_or_else(|| format!("expected HOST:MAX_WORKERS, got {}", s))?;
    let max_workers: u32 = workers
        .parse()
        .map_err(|e| format!("invalid worker count {}: {}", workers, e))?;
    if host.is_empty() || max_workers == 0 {
        return Err(format!("invalid node {}", s));
    }
    Ok(NodeInfo::new(host, max_workers))
}

fn init_logging(level: &str, format: LogFormat) -> anyhow::Result<()> {
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    match format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Text => builder.try_init(),
    }
    .map_err(|e| anyhow::anyhow!("failed to set subscriber: {}", e))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => ClusterConfig::from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => ClusterConfig::default(),
    };
    config.nodes.extend(args.nodes.iter().cloned());
    config.validate()?;

    let level = args
        .log_level
        .clone()
        .unwrap_or_else(|| config.logging.level.clone());
    init_logging(&level, config.logging.format)?;

    if config.nodes.is_empty() {
        bail!("no nodes configured; pass --config or --node HOST:MAX_WORKERS");
    }

    info!("Starting locus simulator v{}", env!("CARGO_PKG_VERSION"));

    let registry = Arc::new(NodeRegistry::with_nodes(config.nodes.clone()));
    let runtime = Arc::new(SimulatedRuntime::new(SimulatedRuntimeConfig::from(
        &config.simulation,
    )));
    let scheduler = Arc::new(TaskScheduler::new(
        registry,
        runtime,
        config.scheduler.clone(),
    ));
    let controller = JobController::new(scheduler);

    let spec = JobSpec::new(args.name, args.inputs).with_scheduler(SchedulerConfig {
        force_local: args.force_local,
        force_remote: args.force_remote,
        max_cores: args.max_cores,
        max_attempts: args.max_attempts,
    });

    let handle = controller.submit(spec).await?;
    let report = controller.wait(&handle).await?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
