use std::{
    fmt,
    path::PathBuf,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use anyhow::{Context, Result, ensure};
use tokio::{
    signal, task,
    time::{self, MissedTickBehavior},
};
use tracing::{debug, error, info, warn};

use crate::{
    collector::Collector,
    dataplane::PinnedMapPipeline,
    model::{PolicyKind, StatsCollection},
    pipeline::PipelineError,
    report::StatsReporter,
    store::SnapshotStore,
};

pub const DEFAULT_COLLECT_INTERVAL_SECS: u64 = 60;
pub const DEFAULT_COLLECT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_REPORT_TIMEOUT_SECS: u64 = 10;

pub struct NodeOptions {
    pub node_name: String,
    pub metrics_pin: PathBuf,
    pub policy_table: PathBuf,
    pub interval: Duration,
    pub collect_timeout: Duration,
    pub report_timeout: Duration,
}

pub fn validate_node_options(opts: &NodeOptions) -> Result<()> {
    ensure!(!opts.node_name.trim().is_empty(), "node name must not be empty");
    ensure!(
        !opts.interval.is_zero(),
        "collection interval must be greater than zero"
    );
    ensure!(
        !opts.collect_timeout.is_zero() && !opts.report_timeout.is_zero(),
        "timeouts must be greater than zero"
    );
    ensure!(
        opts.collect_timeout <= opts.interval,
        "collect timeout ({:?}) must not exceed the collection interval ({:?})",
        opts.collect_timeout,
        opts.interval
    );
    Ok(())
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SkipReason {
    /// A previous cycle was still running.
    Busy,
    CollectFailed,
    ReportFailed,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum CycleOutcome {
    Reported { policies: usize },
    Skipped(SkipReason),
}

impl fmt::Display for CycleOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CycleOutcome::Reported { policies } => write!(f, "reported {policies} policies"),
            CycleOutcome::Skipped(reason) => write!(f, "skipped ({reason:?})"),
        }
    }
}

/// Drives collect, diff, report and re-baseline once per tick.
pub struct StatsAgent {
    node_name: String,
    collector: Collector,
    reporter: Arc<dyn StatsReporter>,
    store: SnapshotStore,
    collect_timeout: Duration,
    report_timeout: Duration,
}

impl StatsAgent {
    pub fn new(
        node_name: impl Into<String>,
        collector: Collector,
        reporter: Arc<dyn StatsReporter>,
        collect_timeout: Duration,
        report_timeout: Duration,
    ) -> Self {
        Self {
            node_name: node_name.into(),
            collector,
            reporter,
            store: SnapshotStore::new(),
            collect_timeout,
            report_timeout,
        }
    }

    #[cfg(test)]
    pub fn store(&self) -> &SnapshotStore {
        &self.store
    }

    /// Runs one cycle. The baseline only moves forward once the summary has
    /// been accepted by the reporter; any failure leaves it untouched so the
    /// next cycle's deltas cover the whole gap.
    pub async fn run_cycle(&self) -> CycleOutcome {
        let Some(guard) = self.store.begin_cycle() else {
            warn!("previous stats cycle still running, skipping");
            return CycleOutcome::Skipped(SkipReason::Busy);
        };

        let collector = self.collector.clone();
        let mut fetch = task::spawn_blocking(move || collector.collect());
        let current = match time::timeout(self.collect_timeout, &mut fetch).await {
            Ok(Ok(Ok(current))) => current,
            Ok(Ok(Err(err))) => {
                error!(error = %err, "failed to collect policy stats, skipping cycle");
                return CycleOutcome::Skipped(SkipReason::CollectFailed);
            }
            Ok(Err(join_err)) => {
                error!(error = %join_err, "policy stats collection panicked, skipping cycle");
                return CycleOutcome::Skipped(SkipReason::CollectFailed);
            }
            Err(_) => {
                error!(
                    timeout = ?self.collect_timeout,
                    "collecting policy stats timed out, skipping cycle"
                );
                // The blocking fetch cannot be cancelled; hold the cycle until
                // it returns so the next fetch never runs beside it.
                tokio::spawn(async move {
                    let _ = fetch.await;
                    drop(guard);
                    debug!("timed out policy stats fetch finished, cycle released");
                });
                return CycleOutcome::Skipped(SkipReason::CollectFailed);
            }
        };

        let summary = guard.summarize(&self.node_name, &current);
        if summary.is_empty() {
            debug!(
                policies = current.policy_count(),
                "no policy traffic since last cycle"
            );
        }
        for kind in PolicyKind::ALL {
            debug!(%kind, changed = summary.policies(kind).len(), "computed policy stats deltas");
        }

        match time::timeout(self.report_timeout, self.reporter.report(&summary)).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                error!(error = ?err, "failed to report policy stats");
                return CycleOutcome::Skipped(SkipReason::ReportFailed);
            }
            Err(_) => {
                error!(timeout = ?self.report_timeout, "reporting policy stats timed out");
                return CycleOutcome::Skipped(SkipReason::ReportFailed);
            }
        }

        guard.commit(current);
        CycleOutcome::Reported {
            policies: summary.policy_count(),
        }
    }

    /// Ticks until `running` is cleared. Ticks that fire while a cycle is
    /// still in progress are dropped rather than queued.
    pub async fn run(self: Arc<Self>, interval: Duration, running: Arc<AtomicBool>) {
        let mut ticker = time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            if !running.load(Ordering::Relaxed) {
                break;
            }
            let outcome = self.run_cycle().await;
            info!(%outcome, "policy stats cycle finished");
        }
    }
}

async fn collect_with_timeout(
    collector: &Collector,
    limit: Duration,
) -> Result<StatsCollection, PipelineError> {
    let collector = collector.clone();
    match time::timeout(limit, task::spawn_blocking(move || collector.collect())).await {
        Ok(Ok(result)) => result,
        Ok(Err(join_err)) => Err(PipelineError::Join(join_err.to_string())),
        Err(_) => Err(PipelineError::Timeout(limit)),
    }
}

/// Runs the agent against the pinned dataplane maps until ctrl-c.
pub async fn run_stats_agent(opts: NodeOptions, reporter: Arc<dyn StatsReporter>) -> Result<()> {
    validate_node_options(&opts)?;

    let pipeline = Arc::new(PinnedMapPipeline::new(&opts.metrics_pin, &opts.policy_table));
    let agent = Arc::new(StatsAgent::new(
        opts.node_name.clone(),
        Collector::new(pipeline),
        reporter,
        opts.collect_timeout,
        opts.report_timeout,
    ));

    info!(
        node = %opts.node_name,
        metrics_pin = %opts.metrics_pin.display(),
        policy_table = %opts.policy_table.display(),
        interval = ?opts.interval,
        "starting policy stats agent"
    );

    let running = Arc::new(AtomicBool::new(true));
    let driver = tokio::spawn(agent.run(opts.interval, running.clone()));

    signal::ctrl_c()
        .await
        .context("failed to wait for ctrl-c")?;
    info!("received shutdown signal, stopping");
    running.store(false, Ordering::Relaxed);

    driver.abort();
    let _ = driver.await;
    Ok(())
}

/// Collects once and returns the current per-policy totals, without diffing.
pub async fn collect_snapshot(
    metrics_pin: PathBuf,
    policy_table: PathBuf,
    limit: Duration,
) -> Result<StatsCollection> {
    let collector = Collector::new(Arc::new(PinnedMapPipeline::new(metrics_pin, policy_table)));
    collect_with_timeout(&collector, limit)
        .await
        .context("failed to collect policy stats")
}
