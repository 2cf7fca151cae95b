//! taskexecd — the TaskGrid task executor daemon.
//!
//! Runs the worker reconcile cycle against a cluster picture read from a
//! JSON snapshot file. Job creation and worker commands are logged, alert
//! events are kept in memory and each discovery snapshot can be written to
//! a file.
//!
//! # Usage
//!
//! ```text
//! taskexecd run  --config taskexec.toml --snapshot cluster.json --discovery-out discovery.json
//! taskexecd once --snapshot cluster.json
//! ```

mod adapters;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::EnvFilter;

use taskgrid_executor::{Backends, ExecutorConfig, Reconciler};

use crate::adapters::{
    DiscoveryWriter, FileSnapshotSource, InMemoryEvents, LoggingCluster, LoggingWorkers,
};

const DEFAULT_LOG_FILTER: &str =
    "info,taskexecd=debug,taskgrid_executor=debug,taskgrid_placement=debug,taskgrid_autoscale=debug";

#[derive(Parser)]
#[command(name = "taskexecd", about = "TaskGrid task executor")]
struct Cli {
    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Reconcile periodically until interrupted.
    Run {
        #[command(flatten)]
        args: CycleArgs,
    },
    /// Run a single cycle and print the result map as JSON.
    Once {
        #[command(flatten)]
        args: CycleArgs,
    },
}

#[derive(clap::Args)]
struct CycleArgs {
    /// Executor config (TOML). Defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Cluster snapshot (JSON), re-read every cycle.
    #[arg(long)]
    snapshot: PathBuf,

    /// Where to write the discovery snapshot after each cycle.
    #[arg(long)]
    discovery_out: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    match cli.command {
        Command::Run { args } => run(args).await,
        Command::Once { args } => once(args).await,
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<ExecutorConfig> {
    match path {
        Some(path) => {
            let config = ExecutorConfig::from_file(path)?;
            info!(path = %path.display(), "config loaded");
            Ok(config)
        }
        None => Ok(ExecutorConfig::default()),
    }
}

fn build(args: &CycleArgs) -> anyhow::Result<(Reconciler, Arc<FileSnapshotSource>)> {
    let config = load_config(args.config.as_deref())?;
    let backends = Backends {
        cluster: Arc::new(LoggingCluster),
        workers: Arc::new(LoggingWorkers),
        events: Arc::new(InMemoryEvents::new()),
        discovery: Arc::new(DiscoveryWriter::new(args.discovery_out.clone())),
    };
    let source = Arc::new(FileSnapshotSource::new(args.snapshot.clone()));
    Ok((Reconciler::new(config, backends), source))
}

async fn run(args: CycleArgs) -> anyhow::Result<()> {
    let (mut reconciler, source) = build(&args)?;
    info!(snapshot = %args.snapshot.display(), "task executor starting");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(async move {
        reconciler.run(source, shutdown_rx).await;
    });

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");
    let _ = shutdown_tx.send(true);
    let _ = handle.await;

    info!("task executor stopped");
    Ok(())
}

async fn once(args: CycleArgs) -> anyhow::Result<()> {
    let (mut reconciler, source) = build(&args)?;
    let input = source.load().await?;
    let result = reconciler.reconcile(&input).await;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}
