use std::{io, path::PathBuf, process::exit, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use clap::{Args, CommandFactory, Parser, Subcommand};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

mod collector;
mod dataplane;
mod diff;
mod model;
mod node;
mod pipeline;
mod report;
mod store;

#[derive(Parser)]
#[command(name = "policy-stats")]
#[command(about = "Per-node network policy traffic statistics agent", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Periodically report per-policy traffic deltas
    Run(RunCommand),
    /// Print the current per-policy totals once and exit
    Snapshot(SnapshotCommand),
}

#[derive(Args)]
struct SourceArgs {
    /// Pinned per-CPU map holding per-rule counters
    #[arg(long, value_name = "PATH", default_value = dataplane::DEFAULT_METRICS_MAP_PIN)]
    metrics_pin: PathBuf,
    /// JSON table mapping rule ids to their owning policies
    #[arg(long, value_name = "PATH", default_value = dataplane::DEFAULT_POLICY_TABLE)]
    policy_map: PathBuf,
    /// Seconds to wait for the dataplane before giving up on a collection
    #[arg(long, value_name = "SECS", default_value_t = node::DEFAULT_COLLECT_TIMEOUT_SECS)]
    collect_timeout_secs: u64,
}

#[derive(Args)]
struct RunCommand {
    /// Name of the node the stats are reported for
    #[arg(long, env = "NODE_NAME")]
    node_name: String,
    #[command(flatten)]
    source: SourceArgs,
    /// Seconds between collection cycles
    #[arg(long, value_name = "SECS", default_value_t = node::DEFAULT_COLLECT_INTERVAL_SECS)]
    interval_secs: u64,
    /// Seconds to wait for a summary to be accepted by the reporter
    #[arg(long, value_name = "SECS", default_value_t = node::DEFAULT_REPORT_TIMEOUT_SECS)]
    report_timeout_secs: u64,
}

#[derive(Args)]
struct SnapshotCommand {
    #[command(flatten)]
    source: SourceArgs,
}

#[tokio::main]
async fn main() {
    init_tracing();
    if let Err(err) = run().await {
        eprintln!("policy-stats error: {err:?}");
        exit(1);
    }
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Run(cmd)) => {
            let opts = node::NodeOptions {
                node_name: cmd.node_name,
                metrics_pin: cmd.source.metrics_pin,
                policy_table: cmd.source.policy_map,
                interval: Duration::from_secs(cmd.interval_secs),
                collect_timeout: Duration::from_secs(cmd.source.collect_timeout_secs),
                report_timeout: Duration::from_secs(cmd.report_timeout_secs),
            };
            let reporter = Arc::new(report::JsonLinesReporter::new(io::stdout()));
            node::run_stats_agent(opts, reporter).await?;
        }
        Some(Commands::Snapshot(cmd)) => {
            let collection = node::collect_snapshot(
                cmd.source.metrics_pin,
                cmd.source.policy_map,
                Duration::from_secs(cmd.source.collect_timeout_secs.max(1)),
            )
            .await?;
            let out = serde_json::to_string_pretty(&collection)
                .context("failed to encode policy stats")?;
            println!("{out}");
        }
        None => {
            Cli::command().print_help().ok();
            println!();
        }
    }

    Ok(())
}
