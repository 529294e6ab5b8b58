use std::{collections::HashMap, fmt, str::FromStr};

use chrono::{DateTime, Utc};
use policy_stats_common::RuleCounters;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Stable identifier of a policy object, used as the aggregation key.
#[derive(Clone, Debug, Default, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Uid(pub String);

impl From<&str> for Uid {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for Uid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Error, Clone, Eq, PartialEq)]
#[error("unsupported policy kind '{0}'")]
pub struct UnsupportedPolicyKind(pub String);

/// The three mutually exclusive namespaces a policy can live in.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String")]
pub enum PolicyKind {
    /// Namespaced standard Kubernetes NetworkPolicy.
    K8sNetworkPolicy,
    /// Cluster-scoped custom policy.
    AntreaClusterNetworkPolicy,
    /// Namespaced custom policy.
    AntreaNetworkPolicy,
}

impl PolicyKind {
    pub const ALL: [PolicyKind; 3] = [
        PolicyKind::K8sNetworkPolicy,
        PolicyKind::AntreaClusterNetworkPolicy,
        PolicyKind::AntreaNetworkPolicy,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PolicyKind::K8sNetworkPolicy => "K8sNetworkPolicy",
            PolicyKind::AntreaClusterNetworkPolicy => "AntreaClusterNetworkPolicy",
            PolicyKind::AntreaNetworkPolicy => "AntreaNetworkPolicy",
        }
    }
}

impl fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PolicyKind {
    type Err = UnsupportedPolicyKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PolicyKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| UnsupportedPolicyKind(s.to_string()))
    }
}

impl TryFrom<String> for PolicyKind {
    type Error = UnsupportedPolicyKind;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Identity of the policy that owns one or more enforcement rules.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct PolicyReference {
    pub kind: PolicyKind,
    /// Empty for cluster-scoped policies.
    #[serde(default)]
    pub namespace: String,
    pub name: String,
    pub uid: Uid,
}

impl fmt::Display for PolicyReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace.is_empty() {
            write!(f, "{} {} ({})", self.kind, self.name, self.uid)
        } else {
            write!(
                f,
                "{} {}/{} ({})",
                self.kind, self.namespace, self.name, self.uid
            )
        }
    }
}

/// Raw counters of one enforcement rule, summed across CPUs.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct RuleMetric {
    pub bytes: u64,
    pub packets: u64,
    pub sessions: u64,
}

impl RuleMetric {
    pub fn merge_cpu(&mut self, counters: &RuleCounters) {
        self.bytes = self.bytes.saturating_add(counters.bytes);
        self.packets = self.packets.saturating_add(counters.packets);
        self.sessions = self.sessions.saturating_add(counters.sessions);
    }
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct TrafficStats {
    pub bytes: u64,
    pub packets: u64,
    pub sessions: u64,
}

impl TrafficStats {
    pub fn new(bytes: u64, packets: u64, sessions: u64) -> Self {
        Self {
            bytes,
            packets,
            sessions,
        }
    }

    pub fn add_rule(&mut self, metric: &RuleMetric) {
        self.bytes = self.bytes.saturating_add(metric.bytes);
        self.packets = self.packets.saturating_add(metric.packets);
        self.sessions = self.sessions.saturating_add(metric.sessions);
    }

    /// Field-wise growth since `previous`. A field that went backwards was
    /// reset, so its current value is the growth since the reset.
    pub fn delta_since(&self, previous: &TrafficStats) -> TrafficStats {
        fn field(current: u64, previous: u64) -> u64 {
            current.checked_sub(previous).unwrap_or(current)
        }
        TrafficStats::new(
            field(self.bytes, previous.bytes),
            field(self.packets, previous.packets),
            field(self.sessions, previous.sessions),
        )
    }

    pub fn is_zero(&self) -> bool {
        self.bytes == 0 && self.packets == 0 && self.sessions == 0
    }
}

/// Traffic attributed to one policy, either a running total or a delta.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct PolicyStats {
    pub policy: PolicyReference,
    pub traffic: TrafficStats,
}

pub type StatsMap = HashMap<Uid, PolicyStats>;

/// Per-policy totals for one collection cycle, partitioned by kind.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct StatsCollection {
    pub network_policy_stats: StatsMap,
    pub antrea_cluster_network_policy_stats: StatsMap,
    pub antrea_network_policy_stats: StatsMap,
}

impl StatsCollection {
    pub fn stats(&self, kind: PolicyKind) -> &StatsMap {
        match kind {
            PolicyKind::K8sNetworkPolicy => &self.network_policy_stats,
            PolicyKind::AntreaClusterNetworkPolicy => &self.antrea_cluster_network_policy_stats,
            PolicyKind::AntreaNetworkPolicy => &self.antrea_network_policy_stats,
        }
    }

    pub fn stats_mut(&mut self, kind: PolicyKind) -> &mut StatsMap {
        match kind {
            PolicyKind::K8sNetworkPolicy => &mut self.network_policy_stats,
            PolicyKind::AntreaClusterNetworkPolicy => {
                &mut self.antrea_cluster_network_policy_stats
            }
            PolicyKind::AntreaNetworkPolicy => &mut self.antrea_network_policy_stats,
        }
    }

    /// Adds one rule's counters to the total of the policy that owns it.
    pub fn add_rule(&mut self, policy: &PolicyReference, metric: &RuleMetric) {
        let entry = self
            .stats_mut(policy.kind)
            .entry(policy.uid.clone())
            .or_insert_with(|| PolicyStats {
                policy: policy.clone(),
                traffic: TrafficStats::default(),
            });
        entry.traffic.add_rule(metric);
    }

    pub fn policy_count(&self) -> usize {
        PolicyKind::ALL
            .iter()
            .map(|kind| self.stats(*kind).len())
            .sum()
    }
}

/// Deltas observed on this node during one cycle, ready to be reported.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct NodeStatsSummary {
    pub node_name: String,
    pub collected_at: DateTime<Utc>,
    pub network_policies: Vec<PolicyStats>,
    pub antrea_cluster_network_policies: Vec<PolicyStats>,
    pub antrea_network_policies: Vec<PolicyStats>,
}

impl NodeStatsSummary {
    pub fn policies(&self, kind: PolicyKind) -> &[PolicyStats] {
        match kind {
            PolicyKind::K8sNetworkPolicy => &self.network_policies,
            PolicyKind::AntreaClusterNetworkPolicy => &self.antrea_cluster_network_policies,
            PolicyKind::AntreaNetworkPolicy => &self.antrea_network_policies,
        }
    }

    pub fn policy_count(&self) -> usize {
        self.network_policies.len()
            + self.antrea_cluster_network_policies.len()
            + self.antrea_network_policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.policy_count() == 0
    }
}
