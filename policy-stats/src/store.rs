use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::{
    diff::calculate_diff,
    model::{NodeStatsSummary, PolicyKind, StatsCollection},
};

/// Holds the last reported totals per policy kind.
///
/// The baseline is only reachable through a [`CycleGuard`], and only one
/// guard can exist at a time, so two cycles never interleave and readers
/// never observe a half-replaced baseline. The guard owns its lock, so it can
/// outlive the cycle that took it while a stalled fetch drains.
#[derive(Default)]
pub struct SnapshotStore {
    baseline: Arc<Mutex<StatsCollection>>,
}

impl SnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims the baseline for one cycle, or returns `None` if another cycle
    /// still holds it.
    pub fn begin_cycle(&self) -> Option<CycleGuard> {
        Arc::clone(&self.baseline)
            .try_lock_owned()
            .ok()
            .map(|baseline| CycleGuard { baseline })
    }

    /// Copy of the current baseline. Waits for a running cycle to finish.
    #[cfg(test)]
    pub async fn baseline(&self) -> StatsCollection {
        self.baseline.lock().await.clone()
    }
}

pub struct CycleGuard {
    baseline: OwnedMutexGuard<StatsCollection>,
}

impl CycleGuard {
    /// Deltas of `current` against the held baseline, one list per kind.
    pub fn summarize(&self, node_name: &str, current: &StatsCollection) -> NodeStatsSummary {
        let diff = |kind: PolicyKind| calculate_diff(current.stats(kind), self.baseline.stats(kind));
        NodeStatsSummary {
            node_name: node_name.to_string(),
            collected_at: Utc::now(),
            network_policies: diff(PolicyKind::K8sNetworkPolicy),
            antrea_cluster_network_policies: diff(PolicyKind::AntreaClusterNetworkPolicy),
            antrea_network_policies: diff(PolicyKind::AntreaNetworkPolicy),
        }
    }

    /// Replaces the whole baseline with `current`, empty maps included, and
    /// returns the previous one.
    pub fn commit(mut self, current: StatsCollection) -> StatsCollection {
        std::mem::replace(&mut *self.baseline, current)
    }
}
